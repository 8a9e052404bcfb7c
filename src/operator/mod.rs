//! Operator confirmation for cases that need hands-on hardware changes.
//!
//! A gated case prints an instruction (insert or remove the USB stick) and
//! hands its continuation to a background task that fires it once the
//! operator presses Enter.

use std::future::Future;
use std::io::{self, IsTerminal, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::runner::Proceed;

/// Boxed future returned by [`OperatorInput`] methods.
pub type InputFuture<'a, T = Key> =
    Pin<Box<dyn Future<Output = Result<T, OperatorError>> + Send + 'a>>;

/// How long a line must have been waiting to count as typed ahead.
const TYPE_AHEAD_WINDOW: Duration = Duration::from_millis(20);

/// A key event observed on the operator's terminal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Key {
    /// The Enter key; the only key that releases a gate.
    Enter,
    /// Any other key, identified by name.
    Other(String),
}

/// Errors raised while waiting for operator input.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum OperatorError {
    /// Raised when the input source reaches end-of-file.
    #[error("operator input closed before confirmation")]
    Closed,
    /// Raised when reading the input source fails.
    #[error("failed to read operator input: {0}")]
    Io(String),
}

/// Source of operator key events.
pub trait OperatorInput: Send + Sync {
    /// Waits for the next key event.
    fn next_key(&self) -> InputFuture<'_>;

    /// Drops key events that arrived before the current prompt was shown.
    fn discard_pending(&self) -> InputFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// Reads confirmations from the controlling terminal's standard input.
///
/// The terminal stays in line mode, so every line terminator is reported as
/// [`Key::Enter`] regardless of what was typed before it. When stdin is a
/// terminal, lines typed before a prompt are discarded; piped input is
/// consumed line by line as scripted.
#[derive(Debug)]
pub struct StdinInput {
    reader: Mutex<BufReader<Stdin>>,
    interactive: bool,
}

impl StdinInput {
    /// Wraps the process's standard input.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reader: Mutex::new(BufReader::new(tokio::io::stdin())),
            interactive: io::stdin().is_terminal(),
        }
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorInput for StdinInput {
    fn next_key(&self) -> InputFuture<'_> {
        Box::pin(async move {
            let mut line = String::new();
            let read = self
                .reader
                .lock()
                .await
                .read_line(&mut line)
                .await
                .map_err(|err| OperatorError::Io(err.to_string()))?;
            if read == 0 {
                return Err(OperatorError::Closed);
            }
            Ok(Key::Enter)
        })
    }

    fn discard_pending(&self) -> InputFuture<'_, ()> {
        Box::pin(async move {
            if !self.interactive {
                return Ok(());
            }
            let mut reader = self.reader.lock().await;
            loop {
                let mut line = String::new();
                match timeout(TYPE_AHEAD_WINDOW, reader.read_line(&mut line)).await {
                    Err(_) => return Ok(()),
                    Ok(Ok(0)) => return Err(OperatorError::Closed),
                    Ok(Ok(_)) => debug!("discarding Enter typed before the prompt"),
                    Ok(Err(err)) => return Err(OperatorError::Io(err.to_string())),
                }
            }
        })
    }
}

/// Holds a case's continuation until the operator confirms.
#[derive(Clone)]
pub struct OperatorGate {
    input: Arc<dyn OperatorInput>,
}

impl std::fmt::Debug for OperatorGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorGate").finish_non_exhaustive()
    }
}

impl OperatorGate {
    /// Creates a gate reading from `input`.
    #[must_use]
    pub fn new(input: Arc<dyn OperatorInput>) -> Self {
        Self { input }
    }

    /// Creates a gate reading from the terminal.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(Arc::new(StdinInput::new()))
    }

    /// Prints `instruction` and fires `proceed` once Enter is observed.
    ///
    /// Keys already queued when the prompt appears are discarded first, so a
    /// stray double Enter cannot release the next gate. Keys other than
    /// Enter are ignored. If the input source fails, the
    /// continuation is abandoned so the runner stops instead of hanging.
    /// Must be called from within a tokio runtime.
    pub fn hold(&self, instruction: &str, proceed: Proceed) {
        writeln!(io::stdout(), "{instruction}").ok();
        let input = Arc::clone(&self.input);
        tokio::spawn(async move {
            let outcome = match input.discard_pending().await {
                Ok(()) => wait_for_enter(input.as_ref()).await,
                Err(err) => Err(err),
            };
            let delivered = match outcome {
                Ok(()) => proceed.signal(),
                Err(err) => {
                    warn!(case = proceed.case(), error = %err, "operator confirmation failed");
                    proceed.abandon(err.to_string())
                }
            };
            if let Err(err) = delivered {
                debug!(error = %err, "operator confirmation not delivered");
            }
        });
    }
}

async fn wait_for_enter(input: &dyn OperatorInput) -> Result<(), OperatorError> {
    loop {
        match input.next_key().await? {
            Key::Enter => return Ok(()),
            Key::Other(name) => debug!(key = %name, "ignoring key while waiting for Enter"),
        }
    }
}
