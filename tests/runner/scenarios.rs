//! BDD scenarios for the shard lifecycle runner.

use rstest_bdd_macros::scenario;

use super::test_helpers::{RunnerContext, runner_context};

#[scenario(
    path = "tests/features/runner.feature",
    name = "Complete the lifecycle after three operator confirmations"
)]
fn scenario_complete_lifecycle(runner_context: RunnerContext) {
    let _ = runner_context;
}

#[scenario(
    path = "tests/features/runner.feature",
    name = "Stop hard when a reply reports failure"
)]
fn scenario_stop_on_false_return_value(runner_context: RunnerContext) {
    let _ = runner_context;
}

#[scenario(
    path = "tests/features/runner.feature",
    name = "Report a dropped connection with the failing case"
)]
fn scenario_report_dropped_connection(runner_context: RunnerContext) {
    let _ = runner_context;
}

#[scenario(
    path = "tests/features/runner.feature",
    name = "Abandon the run when operator input closes"
)]
fn scenario_abandon_on_closed_input(runner_context: RunnerContext) {
    let _ = runner_context;
}
