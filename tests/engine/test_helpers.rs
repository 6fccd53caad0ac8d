//! Shared fixtures for engine BDD scenarios.

use std::fs;
use std::sync::Arc;

use dropship::test_support::{LocalShellRunner, test_transport_config};
use dropship::{Engine, GroupMode, Params, SshTransport, Status, TaskGraph, escape_braces};
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use tempfile::TempDir;

/// Scratch directory standing in for the remote host's filesystem.
#[derive(Clone, Debug)]
pub struct HostDir {
    root: String,
    _tmp: Arc<TempDir>,
}

impl HostDir {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("create host temp dir: {err}"));
        Self {
            root: tmp.path().to_string_lossy().into_owned(),
            _tmp: Arc::new(tmp),
        }
    }

    fn state_dir(&self) -> String {
        format!("{}/.dropship_config", self.root)
    }

    fn run_log(&self) -> String {
        format!("{}/ran.log", self.root)
    }

    /// Number of times a logged command actually ran on the host.
    pub fn run_count(&self) -> usize {
        fs::read_to_string(self.run_log()).map_or(0, |log| log.lines().count())
    }
}

/// Outcome of driving one command or group.
#[derive(Clone, Debug, Default)]
pub struct Outcome {
    pub statuses: Vec<Status>,
    pub stdout: String,
    pub error: Option<String>,
}

#[derive(Default, ScenarioState)]
pub struct EngineState {
    pub host: Slot<HostDir>,
    pub outcome: Slot<Outcome>,
}

#[fixture]
pub fn engine_state() -> EngineState {
    EngineState::default()
}

fn session() -> SshTransport<LocalShellRunner> {
    SshTransport::connect(test_transport_config(), LocalShellRunner::new(), "localhost")
        .unwrap_or_else(|err| panic!("open local session: {err}"))
}

/// Runs `command` in a fresh session, appending a line to the host's run log
/// each time it is actually issued.
pub fn run_logged(host: &HostDir, command: &str, force: bool) -> Outcome {
    let transport = session();
    let engine = Engine::new(&transport, host.state_dir());
    let mut graph = TaskGraph::new();
    let template = format!("echo ran >> {{log}}; {}", escape_braces(command));
    let id = graph
        .add_command(template, None)
        .unwrap_or_else(|err| panic!("add command: {err}"));
    let params = Params::new().with("log", host.run_log());

    let result = engine.exec(&mut graph, id, force, &params);
    let command = graph
        .command(id)
        .unwrap_or_else(|err| panic!("command lookup: {err}"));
    Outcome {
        statuses: vec![command.status()],
        stdout: command.stdout().to_owned(),
        error: result.err().map(|err| err.to_string()),
    }
}

/// Runs `commands` as one serial group in a fresh session.
pub fn run_serial(host: &HostDir, commands: &[String]) -> Outcome {
    let transport = session();
    let engine = Engine::new(&transport, host.state_dir());
    let mut graph = TaskGraph::new();
    let templates: Vec<String> = commands.iter().map(|command| escape_braces(command)).collect();
    let group = graph
        .add_group("steps", GroupMode::Serial, templates, None)
        .unwrap_or_else(|err| panic!("add group: {err}"));

    let result = engine.exec_group(&mut graph, group, &Params::new());
    let members = graph
        .group(group)
        .unwrap_or_else(|err| panic!("group lookup: {err}"))
        .commands()
        .to_vec();
    let statuses = members.into_iter().map(|id| graph.status(id)).collect();
    Outcome {
        statuses,
        stdout: String::new(),
        error: result.err().map(|err| err.to_string()),
    }
}
