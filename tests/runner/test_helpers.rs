//! Shared fixtures for runner BDD scenarios.

use std::sync::Arc;

use rstest::fixture;
use shardcheck::RunSummary;
use shardcheck::test_support::ScriptedInput;

/// Number of cases in the shard lifecycle script.
pub const CASE_COUNT: usize = 14;

#[derive(Clone, Debug)]
pub struct RunnerContext {
    pub shard_id: String,
    pub fail_at: Option<usize>,
    pub drop_at: Option<usize>,
    pub input: Arc<ScriptedInput>,
    pub dispatched: Vec<String>,
    pub outcome: Option<RunOutcome>,
}

#[derive(Clone, Debug)]
pub enum RunOutcome {
    Completed(RunSummary),
    HardFailure { case: usize },
    Transport { case: usize, command: String },
    Abandoned { case: usize },
    Other(String),
}

#[fixture]
pub fn runner_context() -> RunnerContext {
    RunnerContext {
        shard_id: String::from("abc123"),
        fail_at: None,
        drop_at: None,
        input: ScriptedInput::shared(),
        dispatched: Vec::new(),
        outcome: None,
    }
}
