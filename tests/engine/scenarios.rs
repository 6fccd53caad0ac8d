//! BDD scenarios for the command engine.

use rstest_bdd_macros::scenario;

use super::test_helpers::{EngineState, engine_state};

#[scenario(
    path = "tests/features/engine.feature",
    name = "A completed command is skipped on the next session"
)]
fn scenario_completed_command_skipped(#[from(engine_state)] _engine_state: EngineState) {}

#[scenario(
    path = "tests/features/engine.feature",
    name = "A failed command is retried on the next session"
)]
fn scenario_failed_command_retried(#[from(engine_state)] _engine_state: EngineState) {}

#[scenario(
    path = "tests/features/engine.feature",
    name = "A forced command runs again"
)]
fn scenario_forced_command(#[from(engine_state)] _engine_state: EngineState) {}

#[scenario(
    path = "tests/features/engine.feature",
    name = "A failing serial step cancels the steps after it"
)]
fn scenario_serial_cancellation(#[from(engine_state)] _engine_state: EngineState) {}
