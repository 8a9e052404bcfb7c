//! Sequential case runner.
//!
//! Cases run strictly one at a time. Each case resolves its command, sends it
//! to the remote executor, parses the JSON reply, and hands it to the case's
//! validator together with a one-shot [`Proceed`] handle. The next case is
//! not produced until that handle fires.

use std::fmt;
use std::io::{self, Write};

use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::operator::OperatorGate;
use crate::remote::{RemoteError, RemoteExecutor};

mod proceed;

pub use proceed::{Completion, Proceed, ProceedError};

/// State shared across cases.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SuiteState {
    /// Identifier of the removable-media shard, once discovered.
    pub shard_id: Option<String>,
}

impl SuiteState {
    /// Returns the discovered shard id, or an empty string before discovery.
    #[must_use]
    pub fn shard_id_or_empty(&self) -> &str {
        self.shard_id.as_deref().unwrap_or_default()
    }
}

type DeferredCommand = Box<dyn Fn(&SuiteState) -> String + Send + Sync>;

/// Where a case's command text comes from.
pub enum CommandSource {
    /// Text fixed when the case list is built.
    Literal(String),
    /// Text computed from the suite state immediately before dispatch.
    Deferred(DeferredCommand),
}

impl CommandSource {
    /// Wraps fixed command text.
    #[must_use]
    pub fn literal(command: impl Into<String>) -> Self {
        Self::Literal(command.into())
    }

    /// Wraps a producer evaluated at dispatch time.
    #[must_use]
    pub fn deferred(producer: impl Fn(&SuiteState) -> String + Send + Sync + 'static) -> Self {
        Self::Deferred(Box::new(producer))
    }

    /// Produces the command text for the current state.
    #[must_use]
    pub fn resolve(&self, state: &SuiteState) -> String {
        match self {
            Self::Literal(command) => command.clone(),
            Self::Deferred(producer) => producer(state),
        }
    }

    /// Returns `true` when the command depends on earlier results.
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

impl fmt::Debug for CommandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(command) => f.debug_tuple("Literal").field(command).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Everything a validator sees about a finished command.
#[derive(Debug)]
pub struct CaseContext<'a> {
    /// 1-based case id.
    pub id: usize,
    /// Parsed JSON reply.
    pub result: &'a Value,
    /// Shared suite state, writable by the validator.
    pub state: &'a mut SuiteState,
    /// Gate used to wait for operator confirmation.
    pub operator: &'a OperatorGate,
}

type Validator = Box<dyn Fn(CaseContext<'_>, Proceed) -> Result<(), ProceedError> + Send + Sync>;

/// One step of the fixed sequence.
pub struct Case {
    name: String,
    command: CommandSource,
    validator: Validator,
}

impl Case {
    /// Builds a case from its name, command source, and validator.
    ///
    /// The validator must eventually fire or abandon the [`Proceed`] handle,
    /// either before returning or from a task it spawns.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        command: CommandSource,
        validator: impl Fn(CaseContext<'_>, Proceed) -> Result<(), ProceedError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            command,
            validator: Box::new(validator),
        }
    }

    /// Returns the case's short name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the case's command source.
    #[must_use]
    pub const fn command(&self) -> &CommandSource {
        &self.command
    }
}

impl fmt::Debug for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Case")
            .field("name", &self.name)
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Raised when the remote executor cannot run a case's command.
    #[error("case #{case} failed to execute `{command}`: {source}")]
    Transport {
        /// 1-based case id.
        case: usize,
        /// Command that was being dispatched.
        command: String,
        /// Underlying executor error.
        #[source]
        source: RemoteError,
    },
    /// Raised when a reply is not a single JSON document.
    #[error("case #{case} returned malformed JSON: {message}")]
    Parse {
        /// 1-based case id.
        case: usize,
        /// Parser error message.
        message: String,
    },
    /// Raised when a reply lacks `"returnValue": true`. This is the hard
    /// failure that stops the operator from continuing a broken run.
    #[error("case #{case} failed: returnValue is not true in {output}")]
    AssertionFailed {
        /// 1-based case id.
        case: usize,
        /// Raw reply text.
        output: String,
    },
    /// Raised when a case's continuation is abandoned or dropped.
    #[error("case #{case} did not complete: {reason}")]
    Abandoned {
        /// 1-based case id.
        case: usize,
        /// Why the case could not complete.
        reason: String,
    },
    /// Raised when a validator misuses its continuation.
    #[error(transparent)]
    Signal(#[from] ProceedError),
}

impl RunnerError {
    /// Returns `true` for failures that must end the process immediately.
    #[must_use]
    pub const fn is_hard_failure(&self) -> bool {
        matches!(self, Self::AssertionFailed { .. })
    }
}

/// Outcome of a run where every case completed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunSummary {
    /// Number of cases that completed.
    pub completed: usize,
    /// State left behind by the last case.
    pub state: SuiteState,
}

/// Runs cases in order over a shared remote executor.
#[derive(Debug)]
pub struct CaseRunner<E: RemoteExecutor> {
    executor: E,
    operator: OperatorGate,
    state: SuiteState,
}

impl<E: RemoteExecutor> CaseRunner<E> {
    /// Creates a runner with empty suite state.
    #[must_use]
    pub fn new(executor: E, operator: OperatorGate) -> Self {
        Self {
            executor,
            operator,
            state: SuiteState::default(),
        }
    }

    /// Returns the executor, for example to close the connection afterwards.
    #[must_use]
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    /// Returns the current suite state.
    #[must_use]
    pub const fn state(&self) -> &SuiteState {
        &self.state
    }

    /// Runs every case in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] when a command cannot be executed, a reply
    /// cannot be parsed, a reply reports failure, or a case never signals.
    pub async fn run(&mut self, cases: &[Case]) -> Result<RunSummary, RunnerError> {
        info!("cases: {}", cases.len());
        for (index, case) in cases.iter().enumerate() {
            self.run_case(index + 1, case).await?;
        }
        Ok(RunSummary {
            completed: cases.len(),
            state: self.state.clone(),
        })
    }

    async fn run_case(&mut self, id: usize, case: &Case) -> Result<(), RunnerError> {
        info!(case = id, name = case.name(), "running case #{id}");
        let command = case.command().resolve(&self.state);
        info!(case = id, "executing: {command}");

        let output = match self.executor.execute(&command) {
            Ok(output) => output,
            Err(source) => {
                error!(case = id, %command, error = %source, "remote execution failed");
                return Err(RunnerError::Transport {
                    case: id,
                    command,
                    source,
                });
            }
        };
        writeln!(io::stdout(), "OUT: {}", output.stdout).ok();

        let result = parse_reply(id, &output.stdout)?;
        if !returned_true(&result) {
            error!(case = id, "ERROR: returnValue - FALSE");
            return Err(RunnerError::AssertionFailed {
                case: id,
                output: output.stdout,
            });
        }

        let (proceed, completion) = Proceed::channel(id);
        let context = CaseContext {
            id,
            result: &result,
            state: &mut self.state,
            operator: &self.operator,
        };
        (case.validator)(context, proceed)?;
        completion.wait().await
    }
}

fn parse_reply(id: usize, stdout: &str) -> Result<Value, RunnerError> {
    serde_json::from_str(stdout).map_err(|err| RunnerError::Parse {
        case: id,
        message: err.to_string(),
    })
}

/// Reports whether a reply carries `"returnValue": true`.
#[must_use]
pub fn returned_true(result: &Value) -> bool {
    result.get("returnValue").and_then(Value::as_bool) == Some(true)
}
