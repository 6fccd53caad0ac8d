//! BDD step definitions for retry-by-skip execution.

use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{EngineState, HostDir, Outcome, run_logged, run_serial};

fn host(engine_state: &EngineState) -> HostDir {
    engine_state
        .host
        .get()
        .unwrap_or_else(|| panic!("host state directory should be prepared"))
}

fn outcome(engine_state: &EngineState) -> Outcome {
    engine_state
        .outcome
        .get()
        .unwrap_or_else(|| panic!("a command should have run"))
}

#[given("a fresh host state directory")]
fn fresh_host(engine_state: &EngineState) {
    engine_state.host.set(HostDir::new());
}

#[when("the command \"{command}\" runs in a new session")]
fn command_runs(engine_state: &EngineState, command: String) {
    let outcome = run_logged(&host(engine_state), &command, false);
    engine_state.outcome.set(outcome);
}

#[when("the command \"{command}\" is forced in a new session")]
fn command_forced(engine_state: &EngineState, command: String) {
    let outcome = run_logged(&host(engine_state), &command, true);
    engine_state.outcome.set(outcome);
}

#[when("a serial group runs \"{first}\", \"{second}\" and \"{third}\"")]
fn serial_group_runs(engine_state: &EngineState, first: String, second: String, third: String) {
    let outcome = run_serial(&host(engine_state), &[first, second, third]);
    engine_state.outcome.set(outcome);
}

#[then("the command finished as \"{status}\"")]
fn command_finished_as(engine_state: &EngineState, status: String) {
    let finished = outcome(engine_state);
    let last = finished
        .statuses
        .last()
        .unwrap_or_else(|| panic!("outcome should carry a status"));
    assert_eq!(last.as_str(), status);
}

#[then("the group steps finished as \"{statuses}\"")]
fn group_finished_as(engine_state: &EngineState, statuses: String) {
    let finished = outcome(engine_state);
    let rendered: Vec<&str> = finished.statuses.iter().map(|status| status.as_str()).collect();
    assert_eq!(rendered.join(", "), statuses);
}

#[then("the last output was \"{expected}\"")]
fn last_output_was(engine_state: &EngineState, expected: String) {
    assert_eq!(outcome(engine_state).stdout.trim_end(), expected);
}

#[then("the last error mentions \"{fragment}\"")]
fn last_error_mentions(engine_state: &EngineState, fragment: String) {
    let error = outcome(engine_state)
        .error
        .unwrap_or_else(|| panic!("the run should have failed"));
    assert!(error.contains(&fragment), "error was: {error}");
}

#[then("the host ran the command {count:usize} time")]
fn host_ran_command(engine_state: &EngineState, count: usize) {
    assert_eq!(host(engine_state).run_count(), count);
}
