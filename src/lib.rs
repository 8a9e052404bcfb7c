//! Core library for the `shardcheck` shard lifecycle driver.
//!
//! The crate walks a remote database service through the lifecycle of a
//! removable-media shard. It opens one multiplexed SSH connection to the
//! device, runs a fixed list of `luna-send` cases strictly in order, checks
//! each JSON reply for `"returnValue": true`, and pauses for operator
//! confirmation wherever a USB stick must be inserted or removed.

pub mod config;
pub mod logging;
pub mod operator;
pub mod remote;
pub mod runner;
pub mod suite;
pub mod test_support;

pub use config::{ConfigError, ConnectionConfig};
pub use operator::{Key, OperatorError, OperatorGate, OperatorInput, StdinInput};
pub use remote::{
    CommandOutput, CommandRunner, ProcessCommandRunner, RemoteError, RemoteExecutor, RemoteOutput,
    SshSession,
};
pub use runner::{
    Case, CaseContext, CaseRunner, CommandSource, Proceed, ProceedError, RunSummary, RunnerError,
    SuiteState,
};
pub use suite::{describe, shard_lifecycle_cases};
