//! Unit tests for provisioned components.
//!
//! Host programs are stubbed on a local shell runner; file channel and store
//! operations run for real inside a temporary sandbox.

use std::fs;
use std::path::Path;

use rstest::fixture;
use tempfile::TempDir;

use crate::command::Engine;
use crate::test_support::{LocalShellRunner, test_transport_config};
use crate::transport::SshTransport;

mod stacks;

pub(crate) type LocalTransport = SshTransport<LocalShellRunner>;

pub(crate) const CLUSTERS_JSON: &str =
    r#"[{"cluster":"main","configdir":"/etc/postgresql/14/main","pgdata":"/var/lib/postgresql/14/main"}]"#;

const HOST_PROGRAMS: [&str; 18] = [
    "apt ",
    "pip3 ",
    "adduser ",
    "echo ",
    "usermod ",
    "cp -r ",
    "chown ",
    "chmod ",
    "rm -rf ",
    "git clone ",
    "cd /home/",
    "cd /tmp ",
    "systemctl ",
    "ln -sf ",
    "nginx -t",
    "sed -i ",
    "mkdir -p /database",
    "sudo -u postgres ",
];

pub(crate) struct Sandbox {
    pub(crate) transport: LocalTransport,
    pub(crate) runner: LocalShellRunner,
    pub(crate) root: String,
    pub(crate) state_dir: String,
    _dir: TempDir,
}

impl Sandbox {
    pub(crate) fn engine(&self) -> Engine<'_, LocalTransport> {
        Engine::new(&self.transport, self.state_dir.clone())
    }

    pub(crate) fn path(&self, host_path: &str) -> String {
        format!("{}{host_path}", self.root)
    }

    pub(crate) fn read(&self, host_path: &str) -> String {
        fs::read_to_string(self.path(host_path)).expect("sandbox file")
    }
}

#[fixture]
pub(crate) fn sandbox() -> Sandbox {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path().to_string_lossy().into_owned();
    for sub in [
        "etc/systemd/system",
        "etc/nginx/sites-available",
        "home/app/ROOT",
    ] {
        fs::create_dir_all(Path::new(&root).join(sub)).expect("sandbox dirs");
    }

    let runner = LocalShellRunner::new();
    runner.stub("pg_lsclusters", CLUSTERS_JSON);
    for program in HOST_PROGRAMS {
        runner.stub(program, "");
    }
    for host_dir in ["/etc/systemd/", "/etc/nginx/", "/home/app/"] {
        runner.rewrite(host_dir, format!("{root}{host_dir}"));
    }

    let transport = SshTransport::connect(test_transport_config(), runner.clone(), "localhost")
        .expect("local transport");
    Sandbox {
        transport,
        runner,
        state_dir: format!("{root}/.dropship_config"),
        root,
        _dir: dir,
    }
}
