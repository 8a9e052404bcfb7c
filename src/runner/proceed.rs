//! One-shot continuation handed to each case validator.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::oneshot;

use super::RunnerError;

/// Errors raised when a continuation is misused.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProceedError {
    /// Raised when a validator fires its continuation a second time.
    #[error("case #{case} signalled its continuation more than once")]
    AlreadySignalled {
        /// Case whose continuation was reused.
        case: usize,
    },
    /// Raised when the runner stopped listening before the signal arrived.
    #[error("case #{case} signalled after the runner stopped waiting")]
    RunnerGone {
        /// Case whose signal could not be delivered.
        case: usize,
    },
}

#[derive(Debug)]
enum Signal {
    Advance,
    Abandon(String),
}

/// Handle that lets a validator release the runner exactly once.
///
/// Clones share the same underlying slot, so a validator may move a clone
/// into a background task and still rely on the at-most-once check.
#[derive(Clone, Debug)]
pub struct Proceed {
    case: usize,
    slot: Arc<Mutex<Option<oneshot::Sender<Signal>>>>,
}

impl Proceed {
    /// Creates a linked continuation and completion pair for `case`.
    #[must_use]
    pub fn channel(case: usize) -> (Self, Completion) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                case,
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            Completion { case, rx },
        )
    }

    /// Returns the 1-based id of the case this continuation belongs to.
    #[must_use]
    pub const fn case(&self) -> usize {
        self.case
    }

    /// Lets the runner advance to the next case.
    ///
    /// # Errors
    ///
    /// Returns [`ProceedError::AlreadySignalled`] on a second call, or
    /// [`ProceedError::RunnerGone`] when the runner is no longer waiting.
    pub fn signal(&self) -> Result<(), ProceedError> {
        self.send(Signal::Advance)
    }

    /// Stops the run, recording why this case cannot complete.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Proceed::signal`].
    pub fn abandon(&self, reason: impl Into<String>) -> Result<(), ProceedError> {
        self.send(Signal::Abandon(reason.into()))
    }

    fn send(&self, signal: Signal) -> Result<(), ProceedError> {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ProceedError::AlreadySignalled { case: self.case })?;
        sender
            .send(signal)
            .map_err(|_| ProceedError::RunnerGone { case: self.case })
    }
}

/// Receiving side of a [`Proceed`] handle, awaited by the runner.
#[derive(Debug)]
pub struct Completion {
    case: usize,
    rx: oneshot::Receiver<Signal>,
}

impl Completion {
    /// Waits until the paired continuation fires.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Abandoned`] when the validator abandons the
    /// case or drops every clone of its continuation without signalling.
    pub async fn wait(self) -> Result<(), RunnerError> {
        match self.rx.await {
            Ok(Signal::Advance) => Ok(()),
            Ok(Signal::Abandon(reason)) => Err(RunnerError::Abandoned {
                case: self.case,
                reason,
            }),
            Err(_) => Err(RunnerError::Abandoned {
                case: self.case,
                reason: String::from("continuation dropped without being signalled"),
            }),
        }
    }
}
