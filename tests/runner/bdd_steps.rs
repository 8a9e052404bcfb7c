//! BDD step definitions for the shard lifecycle runner.

use rstest_bdd_macros::{given, then, when};
use shardcheck::test_support::{
    ScriptedRunner, json_active_media, json_failed, json_ok, scripted_gate, scripted_session,
};
use shardcheck::{CaseRunner, Key, RunnerError, shard_lifecycle_cases};
use tokio::runtime::Runtime;

use super::test_helpers::{CASE_COUNT, RunOutcome, RunnerContext};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("failed to start runtime: {0}")]
    Runtime(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a device that reports shard \"{shard_id}\"")]
fn device_reports_shard(mut runner_context: RunnerContext, shard_id: String) -> RunnerContext {
    runner_context.shard_id = shard_id;
    runner_context
}

#[given("case \"{case}\" replies with returnValue false")]
fn case_replies_false(mut runner_context: RunnerContext, case: usize) -> RunnerContext {
    runner_context.fail_at = Some(case);
    runner_context
}

#[given("the connection drops at case \"{case}\"")]
fn connection_drops(mut runner_context: RunnerContext, case: usize) -> RunnerContext {
    runner_context.drop_at = Some(case);
    runner_context
}

#[given("the operator presses Enter \"{count}\" times")]
fn operator_presses_enter(runner_context: RunnerContext, count: usize) -> RunnerContext {
    for _ in 0..count {
        runner_context.input.press(Key::Enter);
    }
    runner_context
}

#[given("the operator closes the terminal")]
fn operator_closes_terminal(runner_context: RunnerContext) -> RunnerContext {
    runner_context.input.close();
    runner_context
}

fn script_replies(runner: &ScriptedRunner, context: &RunnerContext) {
    for id in 1..=CASE_COUNT {
        if context.drop_at == Some(id) {
            runner.push_transport_failure();
        } else if context.fail_at == Some(id) {
            runner.push_reply(json_failed());
        } else if id == 3 {
            runner.push_reply(json_active_media(&context.shard_id));
        } else {
            runner.push_reply(json_ok());
        }
    }
}

fn classify(err: RunnerError) -> RunOutcome {
    match err {
        RunnerError::AssertionFailed { case, .. } => RunOutcome::HardFailure { case },
        RunnerError::Transport { case, command, .. } => RunOutcome::Transport { case, command },
        RunnerError::Abandoned { case, .. } => RunOutcome::Abandoned { case },
        other => RunOutcome::Other(other.to_string()),
    }
}

#[when("I run the shard lifecycle script")]
fn run_script(runner_context: RunnerContext) -> Result<RunnerContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Runtime(err.to_string()))?;
    let scripted = ScriptedRunner::new();
    script_replies(&scripted, &runner_context);

    let session = scripted_session(scripted.clone());
    let gate = scripted_gate(&runner_context.input);
    let result = runtime.block_on(async move {
        let mut runner = CaseRunner::new(session, gate);
        runner.run(&shard_lifecycle_cases()).await
    });

    let outcome = match result {
        Ok(summary) => RunOutcome::Completed(summary),
        Err(err) => classify(err),
    };

    Ok(RunnerContext {
        dispatched: scripted.remote_commands(),
        outcome: Some(outcome),
        ..runner_context
    })
}

fn outcome(runner_context: &RunnerContext) -> Result<&RunOutcome, StepError> {
    runner_context
        .outcome
        .as_ref()
        .ok_or_else(|| StepError::Assertion(String::from("missing outcome")))
}

fn dispatched_command(runner_context: &RunnerContext, case: usize) -> Result<&str, StepError> {
    runner_context
        .dispatched
        .get(case.wrapping_sub(1))
        .map(String::as_str)
        .ok_or_else(|| StepError::Assertion(format!("case {case} was never dispatched")))
}

#[then("the run completes \"{count}\" cases")]
fn run_completes(runner_context: &RunnerContext, count: usize) -> Result<(), StepError> {
    match outcome(runner_context)? {
        RunOutcome::Completed(summary) if summary.completed == count => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected {count} completed cases, got {other:?}"
        ))),
    }
}

#[then("case \"{case}\" targets the discovered shard")]
fn case_targets_shard(runner_context: &RunnerContext, case: usize) -> Result<(), StepError> {
    let command = dispatched_command(runner_context, case)?;
    let expected = format!(r#"shardId": "{}""#, runner_context.shard_id);
    if command.contains(&expected) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "case {case} command lacks {expected}: {command}"
        )))
    }
}

#[then("case \"{case}\" restores persistent mode")]
fn case_restores_persistent(runner_context: &RunnerContext, case: usize) -> Result<(), StepError> {
    let command = dispatched_command(runner_context, case)?;
    if command.contains("setShardMode") && command.contains(r#""transient":false"#) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "case {case} does not restore persistent mode: {command}"
        )))
    }
}

#[then("the run stops with a hard failure at case \"{case}\"")]
fn run_stops_hard(runner_context: &RunnerContext, case: usize) -> Result<(), StepError> {
    match outcome(runner_context)? {
        RunOutcome::HardFailure { case: actual } if *actual == case => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected hard failure at case {case}, got {other:?}"
        ))),
    }
}

#[then("the run fails with a transport error at case \"{case}\"")]
fn run_fails_transport(runner_context: &RunnerContext, case: usize) -> Result<(), StepError> {
    let expected = dispatched_command(runner_context, case)?;
    match outcome(runner_context)? {
        RunOutcome::Transport {
            case: actual,
            command,
        } if *actual == case && command == expected => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected transport error at case {case}, got {other:?}"
        ))),
    }
}

#[then("the run is abandoned at case \"{case}\"")]
fn run_abandoned(runner_context: &RunnerContext, case: usize) -> Result<(), StepError> {
    match outcome(runner_context)? {
        RunOutcome::Abandoned { case: actual } if *actual == case => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected abandoned run at case {case}, got {other:?}"
        ))),
    }
}

#[then("\"{count}\" commands were dispatched")]
fn commands_dispatched(runner_context: &RunnerContext, count: usize) -> Result<(), StepError> {
    let actual = runner_context.dispatched.len();
    if actual == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} dispatched commands, got {actual}: {:?}",
            runner_context.dispatched
        )))
    }
}
