//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::rc::Rc;
use std::sync::{Arc, PoisonError};

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{Mutex, MutexGuard, mpsc};

use crate::config::ConnectionConfig;
use crate::operator::{InputFuture, Key, OperatorError, OperatorGate, OperatorInput};
use crate::remote::{CommandOutput, CommandRunner, RemoteError, SshSession};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Returns the final argument, which for `ssh` is the remote command.
    #[must_use]
    pub fn remote_command(&self) -> String {
        self.args
            .last()
            .map(|arg| arg.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Returns the remote commands dispatched so far, in order.
    #[must_use]
    pub fn remote_commands(&self) -> Vec<String> {
        self.invocations
            .borrow()
            .iter()
            .map(CommandInvocation::remote_command)
            .collect()
    }

    /// Pushes a successful exit status with no output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a successful exit status carrying a JSON reply on stdout.
    pub fn push_reply(&self, json: impl Into<String>) {
        self.push_output(Some(0), json, "");
    }

    /// Pushes an `ssh` transport failure (exit status 255).
    pub fn push_transport_failure(&self) {
        self.push_output(
            Some(crate::remote::SSH_TRANSPORT_FAILURE),
            "",
            "ssh: connect to host device port 22: Connection refused",
        );
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| RemoteError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Operator input fed by the test through [`ScriptedInput::press`].
#[derive(Debug)]
pub struct ScriptedInput {
    tx: std::sync::Mutex<Option<mpsc::UnboundedSender<Key>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Key>>,
    interactive: bool,
}

impl ScriptedInput {
    /// Creates a shared input with no pending keys.
    ///
    /// Keys queued before a prompt are consumed in order, as piped stdin is.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Self::build(false)
    }

    /// Creates a shared input that behaves like a terminal: keys queued
    /// before a prompt is shown are discarded.
    #[must_use]
    pub fn interactive() -> Arc<Self> {
        Self::build(true)
    }

    fn build(interactive: bool) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx: std::sync::Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
            interactive,
        })
    }

    /// Queues a key event.
    pub fn press(&self, key: Key) {
        if let Some(tx) = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            tx.send(key).ok();
        }
    }

    /// Simulates end-of-file once queued keys are consumed.
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

impl OperatorInput for ScriptedInput {
    fn next_key(&self) -> InputFuture<'_> {
        Box::pin(async move {
            self.rx
                .lock()
                .await
                .recv()
                .await
                .ok_or(OperatorError::Closed)
        })
    }

    fn discard_pending(&self) -> InputFuture<'_, ()> {
        Box::pin(async move {
            if !self.interactive {
                return Ok(());
            }
            let mut rx = self.rx.lock().await;
            loop {
                match rx.try_recv() {
                    Ok(_) => {}
                    Err(TryRecvError::Empty) => return Ok(()),
                    Err(TryRecvError::Disconnected) => return Err(OperatorError::Closed),
                }
            }
        })
    }
}

/// Wraps a scripted input in an [`OperatorGate`].
#[must_use]
pub fn scripted_gate(input: &Arc<ScriptedInput>) -> OperatorGate {
    let shared: Arc<dyn OperatorInput> = input.clone();
    OperatorGate::new(shared)
}

/// Builds a valid connection configuration pointing at a fake device.
#[must_use]
pub fn connection_config() -> ConnectionConfig {
    ConnectionConfig {
        host: String::from("device.local"),
        port: 22,
        username: String::from("root"),
        identity_file: None,
        ssh_bin: String::from("ssh"),
        ssh_batch_mode: true,
        ssh_strict_host_key_checking: false,
        ssh_known_hosts_file: String::from("/dev/null"),
        control_persist: String::from("10m"),
    }
}

/// Builds a session over `runner` with a fixed control socket path.
///
/// # Panics
///
/// Panics if [`connection_config`] no longer validates.
#[must_use]
pub fn scripted_session(runner: ScriptedRunner) -> SshSession<ScriptedRunner> {
    SshSession::new(connection_config(), runner)
        .unwrap_or_else(|err| panic!("scripted session config should validate: {err}"))
        .with_control_path("/tmp/shardcheck-test.sock")
}

/// Minimal successful reply.
#[must_use]
pub fn json_ok() -> String {
    String::from(r#"{"returnValue":true}"#)
}

/// Minimal failed reply.
#[must_use]
pub fn json_failed() -> String {
    String::from(r#"{"returnValue":false}"#)
}

/// Produces a `listActiveMedia` reply naming one shard.
#[must_use]
pub fn json_active_media(shard_id: &str) -> String {
    format!(r#"{{"returnValue":true,"media":[{{"shardId":"{shard_id}"}}]}}"#)
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
