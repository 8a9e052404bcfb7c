//! Remote command execution over one persistent SSH connection.
//!
//! The session shells out to the system `ssh` client and relies on OpenSSH
//! connection multiplexing: the first invocation starts a control master
//! bound to a per-run socket, and every case's command rides that master.
//! Closing the session asks the master to exit.

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, ConnectionConfig};

mod types;
mod util;

pub use types::{CommandOutput, CommandRunner, ProcessCommandRunner, RemoteExecutor, RemoteOutput};
pub use util::expand_tilde;

/// Exit status `ssh` reserves for its own connection failures.
pub const SSH_TRANSPORT_FAILURE: i32 = 255;

/// Smallest `sun_path` capacity among supported platforms (macOS and BSD).
pub const UNIX_SOCKET_PATH_MAX: usize = 104;

/// Length of the `.XXXXXXXXXXXXXXXX` suffix ssh appends while binding the
/// master socket, before renaming it to `ControlPath`.
pub const SSH_CONTROL_BIND_SUFFIX: usize = 17;

const FALLBACK_SOCKET_DIR: &str = "/tmp";

/// Picks the control socket path for a run identified by `token`.
///
/// The socket lives in `temp_dir` unless the path ssh binds would overflow
/// [`UNIX_SOCKET_PATH_MAX`], in which case it moves to `/tmp`.
#[must_use]
pub fn control_socket_path(temp_dir: &Utf8Path, token: &str) -> Utf8PathBuf {
    let file_name = format!("shardcheck-{token}");
    let preferred = temp_dir.join(&file_name);
    if preferred.as_str().len() + SSH_CONTROL_BIND_SUFFIX < UNIX_SOCKET_PATH_MAX {
        return preferred;
    }
    debug!(temp_dir = %temp_dir, "temp dir too long for a control socket; using /tmp");
    Utf8Path::new(FALLBACK_SOCKET_DIR).join(file_name)
}

/// Errors surfaced while talking to the remote host.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RemoteError {
    /// Raised when the connection settings fail validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when a local command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the control master cannot be established.
    #[error("failed to connect to {destination} (status {status_text}): {stderr}")]
    Connect {
        /// `user@host` destination that was dialled.
        destination: String,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from `ssh`.
        stderr: String,
    },
    /// Raised when `ssh` reports a transport failure while running a command.
    #[error("ssh transport failed (status {status_text}): {stderr}")]
    Transport {
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from `ssh`.
        stderr: String,
    },
    /// Raised when the control master refuses to exit.
    #[error("failed to close connection (status {status_text}): {stderr}")]
    Close {
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from `ssh`.
        stderr: String,
    },
}

/// A persistent SSH connection to the device under test.
#[derive(Clone, Debug)]
pub struct SshSession<R: CommandRunner> {
    config: ConnectionConfig,
    runner: R,
    control_path: Utf8PathBuf,
}

impl SshSession<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Config`] when validation fails.
    pub fn with_process_runner(config: ConnectionConfig) -> Result<Self, RemoteError> {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> SshSession<R> {
    /// Creates a session with a fresh control socket under the system
    /// temporary directory. No connection is made until [`Self::connect`].
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Config`] when configuration validation fails.
    pub fn new(config: ConnectionConfig, runner: R) -> Result<Self, RemoteError> {
        config.validate()?;
        let temp_dir = Utf8PathBuf::from_path_buf(std::env::temp_dir())
            .unwrap_or_else(|_| Utf8PathBuf::from(FALLBACK_SOCKET_DIR));
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let token = run_id.get(..8).unwrap_or(run_id.as_str());
        let control_path = control_socket_path(&temp_dir, token);
        Ok(Self {
            config,
            runner,
            control_path,
        })
    }

    /// Replaces the control socket path.
    #[must_use]
    pub fn with_control_path(mut self, control_path: impl Into<Utf8PathBuf>) -> Self {
        self.control_path = control_path.into();
        self
    }

    /// Returns the configuration the session was built with.
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Returns the control socket used for multiplexing.
    #[must_use]
    pub const fn control_path(&self) -> &Utf8PathBuf {
        &self.control_path
    }

    /// Establishes the control master. Once this returns, cases may run.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Connect`] when `ssh` cannot reach the host, or
    /// [`RemoteError::Spawn`] when the client cannot be started.
    pub fn connect(&self) -> Result<(), RemoteError> {
        let args = self.build_exec_args("true");
        let output = self.runner.run(&self.config.ssh_bin, &args)?;
        if !output.is_success() {
            return Err(RemoteError::Connect {
                destination: self.config.destination(),
                status_text: output.status_text(),
                stderr: output.stderr,
            });
        }
        info!(destination = %self.config.destination(), "Connection :: connect");
        Ok(())
    }

    /// Asks the control master to exit.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Close`] when the master rejects the request.
    pub fn close(&self) -> Result<(), RemoteError> {
        let mut args = self.common_ssh_options();
        args.push(OsString::from("-O"));
        args.push(OsString::from("exit"));
        args.push(OsString::from(self.config.destination()));
        let output = self.runner.run(&self.config.ssh_bin, &args)?;
        if !output.is_success() {
            return Err(RemoteError::Close {
                status_text: output.status_text(),
                stderr: output.stderr,
            });
        }
        info!("Connection :: close");
        Ok(())
    }

    fn build_exec_args(&self, remote_command: &str) -> Vec<OsString> {
        let mut args = self.common_ssh_options();
        args.push(OsString::from(self.config.destination()));
        args.push(OsString::from(remote_command));
        args
    }

    fn common_ssh_options(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.config.port.to_string()),
        ];

        if let Some(ref identity_file) = self.config.identity_file {
            args.push(OsString::from("-i"));
            args.push(OsString::from(expand_tilde(identity_file)));
        }

        if self.config.ssh_batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.ssh_known_hosts_file
            )));
        }

        args.push(OsString::from("-o"));
        args.push(OsString::from("ControlMaster=auto"));
        args.push(OsString::from("-o"));
        args.push(OsString::from(format!("ControlPath={}", self.control_path)));
        args.push(OsString::from("-o"));
        args.push(OsString::from(format!(
            "ControlPersist={}",
            self.config.control_persist
        )));

        args
    }
}

impl<R: CommandRunner> RemoteExecutor for SshSession<R> {
    fn execute(&self, command: &str) -> Result<RemoteOutput, RemoteError> {
        let args = self.build_exec_args(command);
        let output = self.runner.run(&self.config.ssh_bin, &args)?;
        if output.code == Some(SSH_TRANSPORT_FAILURE) {
            return Err(RemoteError::Transport {
                status_text: output.status_text(),
                stderr: output.stderr,
            });
        }
        debug!(exit_code = ?output.code, bytes = output.stdout.len(), "remote command finished");

        Ok(RemoteOutput {
            exit_code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
mod tests;
