//! Unit tests for the SSH transport and file channel.

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::test_support::{LocalShellRunner, ScriptedRunner, test_transport_config};

#[fixture]
fn multiplexed_config() -> TransportConfig {
    TransportConfig {
        ssh_identity_file: Some(String::from("/keys/id_ed25519")),
        ssh_control_path: String::from("/tmp/dropship-%C"),
        ssh_port: 2222,
        ..test_transport_config()
    }
}

fn local_transport() -> SshTransport<LocalShellRunner> {
    SshTransport::connect(test_transport_config(), LocalShellRunner::new(), "127.0.0.1")
        .unwrap_or_else(|err| panic!("local transport should connect: {err}"))
}

fn scratch_dir() -> (TempDir, String) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().to_string_lossy().into_owned();
    (dir, path)
}

#[rstest]
fn connect_runs_probe_with_multiplexing_options(multiplexed_config: TransportConfig) {
    let runner = ScriptedRunner::new();
    runner.push_success();

    let transport = SshTransport::connect(multiplexed_config, runner.clone(), "10.0.0.5")
        .expect("probe should succeed");

    let invocations = runner.invocations();
    let probe = invocations.first().expect("probe invocation");
    assert_eq!(probe.program, "ssh");
    let rendered = probe.command_string();
    assert!(rendered.contains("-p 2222"), "rendered: {rendered}");
    assert!(rendered.contains("-i /keys/id_ed25519"), "rendered: {rendered}");
    assert!(rendered.contains("ControlMaster=auto"), "rendered: {rendered}");
    assert!(rendered.contains("ControlPath=/tmp/dropship-%C"), "rendered: {rendered}");
    assert!(rendered.contains("ControlPersist=300"), "rendered: {rendered}");
    assert!(rendered.ends_with("root@10.0.0.5 true"), "rendered: {rendered}");
    assert_eq!(transport.destination(), "root@10.0.0.5");
}

#[rstest]
fn connect_omits_control_options_when_multiplexing_disabled() {
    let runner = ScriptedRunner::new();
    runner.push_success();

    SshTransport::connect(test_transport_config(), runner.clone(), "host").expect("connect");

    let rendered = runner
        .invocations()
        .first()
        .expect("probe invocation")
        .command_string();
    assert!(!rendered.contains("ControlMaster"), "rendered: {rendered}");
}

#[rstest]
fn connect_reports_probe_failure_as_connection_error() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(255), "", "ssh: connect to host 10.0.0.9 port 22: Connection refused\n");

    let err = SshTransport::connect(test_transport_config(), runner, "10.0.0.9")
        .expect_err("probe should fail");

    assert_eq!(
        err,
        TransportError::Connection {
            destination: String::from("root@10.0.0.9"),
            stderr: String::from("ssh: connect to host 10.0.0.9 port 22: Connection refused"),
        }
    );
}

#[rstest]
fn connect_rejects_invalid_config() {
    let config = TransportConfig {
        ssh_user: String::from("  "),
        ..test_transport_config()
    };

    let err = SshTransport::connect(config, ScriptedRunner::new(), "host")
        .expect_err("blank user should be rejected");

    assert_eq!(
        err,
        TransportError::InvalidConfig {
            field: String::from("ssh_user")
        }
    );
    assert!(err.to_string().contains("DROPSHIP_SSH_USER"));
}

#[rstest]
#[case(Some(0), Ok(0))]
#[case(Some(3), Ok(3))]
fn run_command_reports_remote_exit_codes(
    #[case] code: Option<i32>,
    #[case] expected: Result<i32, ()>,
) {
    let runner = ScriptedRunner::new();
    runner.push_success();
    runner.push_output(code, "out", "err");
    let transport = SshTransport::connect(test_transport_config(), runner, "host").expect("connect");

    let result = transport.run_command("echo hi").map(|res| res.exit_code);

    assert_eq!(result.map_err(|_| ()), expected);
}

#[rstest]
fn run_command_maps_ssh_failure_status_to_channel_error() {
    let runner = ScriptedRunner::new();
    runner.push_success();
    runner.push_output(Some(SSH_FAILURE_STATUS), "", "broken pipe");
    let transport = SshTransport::connect(test_transport_config(), runner, "host").expect("connect");

    let err = transport.run_command("uptime").expect_err("channel failure");

    assert_eq!(
        err,
        TransportError::Channel {
            command: String::from("uptime"),
            stderr: String::from("broken pipe"),
        }
    );
}

#[rstest]
fn run_command_without_exit_status_is_terminated() {
    let runner = ScriptedRunner::new();
    runner.push_success();
    runner.push_output(None, "", "");
    let transport = SshTransport::connect(test_transport_config(), runner, "host").expect("connect");

    let err = transport.run_command("sleep 100").expect_err("terminated");

    assert!(matches!(err, TransportError::Terminated { .. }), "got {err:?}");
}

#[rstest]
fn close_requests_master_exit(multiplexed_config: TransportConfig) {
    let runner = ScriptedRunner::new();
    runner.push_success();
    runner.push_success();
    let transport =
        SshTransport::connect(multiplexed_config, runner.clone(), "host").expect("connect");

    transport.close();

    let invocations = runner.invocations();
    let rendered = invocations.last().expect("close invocation").command_string();
    assert!(rendered.ends_with("-O exit root@host"), "rendered: {rendered}");
}

#[rstest]
fn local_transport_separates_stdout_and_stderr() {
    let transport = local_transport();

    let result = transport
        .run_command("echo out; echo err >&2; exit 4")
        .expect("command should run");

    assert_eq!(
        result,
        CommandResult {
            exit_code: 4,
            stdout: String::from("out\n"),
            stderr: String::from("err\n"),
        }
    );
}

#[rstest]
fn file_channel_round_trips_contents_with_quotes() {
    let (_dir, root) = scratch_dir();
    let transport = local_transport();
    let channel = transport.file_channel();
    let path = format!("{root}/record.Command");
    let contents = "{\"text\":\"it's \\\"quoted\\\" $HOME\"}\nsecond line";

    channel.write(&path, contents).expect("write");

    assert_eq!(channel.read(&path).expect("read"), Some(contents.to_owned()));
    assert_eq!(channel.stat(&path).expect("stat"), Some(FileKind::File));
}

#[rstest]
fn file_channel_writes_contents_beyond_argument_limit() {
    let (_dir, root) = scratch_dir();
    let transport = local_transport();
    let channel = transport.file_channel();
    let path = format!("{root}/large.Command");
    let contents = format!("{}\n", "x".repeat(300_000));

    channel.write(&path, &contents).expect("write");

    assert_eq!(channel.read(&path).expect("read"), Some(contents));
}

#[rstest]
fn file_channel_sends_contents_on_stdin() {
    let runner = ScriptedRunner::new();
    runner.push_success();
    runner.push_success();
    let transport = SshTransport::connect(test_transport_config(), runner.clone(), "host")
        .expect("connect");

    transport
        .file_channel()
        .write("/state/a.Command", "{\"stdout\":\"hello\"}")
        .expect("write");

    let invocations = runner.invocations();
    let write = invocations.last().expect("write invocation");
    let remote = write.remote_command().expect("remote command");
    assert!(remote.starts_with("cat > "), "remote: {remote}");
    assert!(!remote.contains("hello"), "remote: {remote}");
    assert_eq!(write.stdin.as_deref(), Some("{\"stdout\":\"hello\"}"));
}

#[rstest]
fn run_with_input_maps_ssh_failure_status_to_channel_error() {
    let runner = ScriptedRunner::new();
    runner.push_success();
    runner.push_output(Some(SSH_FAILURE_STATUS), "", "broken pipe");
    let transport = SshTransport::connect(test_transport_config(), runner, "host")
        .expect("connect");

    let err = transport
        .run_with_input("cat > /tmp/x", "data")
        .expect_err("ssh failure");

    assert!(matches!(err, TransportError::Channel { .. }), "got {err:?}");
}

#[rstest]
fn file_channel_reports_missing_paths_as_absent() {
    let (_dir, root) = scratch_dir();
    let transport = local_transport();
    let channel = transport.file_channel();
    let missing = format!("{root}/nope/missing.Command");

    assert_eq!(channel.read(&missing).expect("read"), None);
    assert_eq!(channel.stat(&missing).expect("stat"), None);
    assert!(
        channel
            .list_glob(&format!("{root}/nope"), "*.Command")
            .expect("list")
            .is_empty()
    );
}

#[rstest]
fn file_channel_mkdir_and_sorted_glob() {
    let (_dir, root) = scratch_dir();
    let transport = local_transport();
    let channel = transport.file_channel();
    let state = format!("{root}/state/nested");

    channel.mkdir(&state).expect("mkdir");
    for name in ["b.Database", "a.Database", "c.RedisCache"] {
        channel.write(&format!("{state}/{name}"), "{}").expect("write");
    }

    assert_eq!(channel.stat(&state).expect("stat"), Some(FileKind::Directory));
    assert_eq!(
        channel.list_glob(&state, "*.Database").expect("list"),
        vec![String::from("a.Database"), String::from("b.Database")]
    );
}

#[rstest]
#[case("*.Database; rm -rf /")]
#[case("$(whoami)")]
#[case("")]
fn file_channel_rejects_unsafe_patterns(#[case] pattern: &str) {
    let transport = local_transport();

    let err = transport
        .file_channel()
        .list_glob("/tmp", pattern)
        .expect_err("pattern should be rejected");

    assert!(matches!(err, TransportError::InvalidPattern { .. }), "got {err:?}");
}

#[rstest]
fn upload_file_copies_local_contents() {
    let (_dir, root) = scratch_dir();
    let local = Utf8PathBuf::from(format!("{root}/local.env"));
    std::fs::write(&local, "DEBUG=False\n").expect("seed local file");
    let transport = local_transport();
    let remote = format!("{root}/remote.env");

    transport
        .file_channel()
        .upload_file(&local, &remote)
        .expect("upload");

    assert_eq!(
        std::fs::read_to_string(&remote).expect("read remote"),
        "DEBUG=False\n"
    );
}

#[rstest]
fn upload_file_reports_missing_local_file() {
    let transport = local_transport();

    let err = transport
        .file_channel()
        .upload_file(Utf8PathBuf::from("/definitely/not/here.env").as_path(), "/tmp/x")
        .expect_err("missing local file");

    assert!(matches!(err, TransportError::LocalFile { .. }), "got {err:?}");
}
