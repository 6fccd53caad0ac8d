//! Unit tests for the command engine.

use rstest::fixture;
use tempfile::TempDir;

use super::Engine;
use crate::test_support::{LocalShellRunner, test_transport_config};
use crate::transport::SshTransport;

mod template;

pub(super) type LocalTransport = SshTransport<LocalShellRunner>;

/// Transport backed by the local shell, plus a scratch state directory.
pub(super) struct Harness {
    pub(super) transport: LocalTransport,
    pub(super) runner: LocalShellRunner,
    pub(super) state_dir: String,
    _dir: TempDir,
}

impl Harness {
    pub(super) fn engine(&self) -> Engine<'_, LocalTransport> {
        Engine::new(&self.transport, self.state_dir.clone())
    }
}

#[fixture]
pub(super) fn harness() -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let state_dir = format!("{}/.dropship_config", dir.path().display());
    let runner = LocalShellRunner::new();
    let transport = SshTransport::connect(test_transport_config(), runner.clone(), "localhost")
        .expect("local transport");
    Harness {
        transport,
        runner,
        state_dir,
        _dir: dir,
    }
}
