//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::process::{Child, Command, Stdio};
use std::rc::Rc;

use tokio::sync::{Mutex, MutexGuard};

use crate::transport::{
    ChildProcess, CommandOutput, CommandRunner, RunningCommand, TransportConfig, TransportError,
};

/// Records a single invocation made through a test runner.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Data written to the program's standard input, if any.
    pub stdin: Option<String>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Returns the final argument, which is the remote command for `ssh`.
    #[must_use]
    pub fn remote_command(&self) -> Option<String> {
        self.args
            .last()
            .map(|arg| arg.to_string_lossy().into_owned())
    }
}

/// An output that is already available when "spawned".
struct Finished(CommandOutput);

impl RunningCommand for Finished {
    fn wait(self: Box<Self>) -> Result<CommandOutput, TransportError> {
        Ok(self.0)
    }
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status with no output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }

    fn next_response(
        &self,
        program: &str,
        args: &[OsString],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, TransportError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
            stdin: stdin.map(str::to_owned),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| TransportError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, TransportError> {
        self.next_response(program, args, None)
    }

    fn spawn(
        &self,
        program: &str,
        args: &[OsString],
    ) -> Result<Box<dyn RunningCommand>, TransportError> {
        let output = self.next_response(program, args, None)?;
        Ok(Box::new(Finished(output)))
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &str,
    ) -> Result<CommandOutput, TransportError> {
        self.next_response(program, args, Some(input))
    }
}

/// Runner that executes the remote command of an `ssh` invocation with the
/// local `sh`, so the engine can be exercised end to end without a host.
///
/// Control requests (`ssh -O exit`) succeed without running anything.
/// Commands starting with a stubbed prefix return canned output instead of
/// running, with the most recent matching stub winning. Path rewrites
/// redirect host paths such as `/etc/` into a sandbox directory.
#[derive(Clone, Debug, Default)]
pub struct LocalShellRunner {
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
    stubs: Rc<RefCell<Vec<(String, CommandOutput)>>>,
    rewrites: Rc<RefCell<Vec<(String, String)>>>,
}

impl LocalShellRunner {
    /// Creates a runner with an empty invocation log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Returns the remote commands issued so far, in order.
    #[must_use]
    pub fn remote_commands(&self) -> Vec<String> {
        self.invocations
            .borrow()
            .iter()
            .filter_map(CommandInvocation::remote_command)
            .collect()
    }

    /// Counts issued remote commands exactly equal to `command`.
    #[must_use]
    pub fn count_of(&self, command: &str) -> usize {
        self.remote_commands()
            .iter()
            .filter(|issued| issued.as_str() == command)
            .count()
    }

    /// Answers commands starting with `prefix` with `stdout` and exit 0.
    pub fn stub(&self, prefix: impl Into<String>, stdout: impl Into<String>) {
        self.stubs.borrow_mut().push((
            prefix.into(),
            CommandOutput {
                code: Some(0),
                stdout: stdout.into(),
                stderr: String::new(),
            },
        ));
    }

    /// Answers commands starting with `prefix` with exit `code`.
    pub fn stub_failure(&self, prefix: impl Into<String>, code: i32, stderr: impl Into<String>) {
        self.stubs.borrow_mut().push((
            prefix.into(),
            CommandOutput {
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.into(),
            },
        ));
    }

    /// Removes every stub registered for exactly `prefix`.
    pub fn unstub(&self, prefix: &str) {
        self.stubs.borrow_mut().retain(|(existing, _)| existing != prefix);
    }

    /// Replaces `from` with `to` in every command that is actually run.
    pub fn rewrite(&self, from: impl Into<String>, to: impl Into<String>) {
        self.rewrites.borrow_mut().push((from.into(), to.into()));
    }

    fn stubbed(&self, script: &str) -> Option<CommandOutput> {
        self.stubs
            .borrow()
            .iter()
            .rev()
            .find(|(prefix, _)| script.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
    }

    fn shell(&self, script: &str, stdin: Stdio) -> Result<Child, TransportError> {
        Command::new("sh")
            .arg("-c")
            .arg(self.rewritten(script))
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| TransportError::Spawn {
                program: String::from("sh"),
                message: err.to_string(),
            })
    }

    fn rewritten(&self, script: &str) -> String {
        self.rewrites
            .borrow()
            .iter()
            .fold(script.to_owned(), |acc, (from, to)| acc.replace(from.as_str(), to))
    }

    fn record(&self, program: &str, args: &[OsString], stdin: Option<&str>) -> Option<String> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
            stdin: stdin.map(str::to_owned),
        });
        if args.iter().any(|arg| arg == "-O") {
            return None;
        }
        args.last().map(|arg| arg.to_string_lossy().into_owned())
    }
}

impl CommandRunner for LocalShellRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, TransportError> {
        self.spawn(program, args)?.wait()
    }

    fn spawn(
        &self,
        program: &str,
        args: &[OsString],
    ) -> Result<Box<dyn RunningCommand>, TransportError> {
        let Some(script) = self.record(program, args, None) else {
            return Ok(Box::new(Finished(CommandOutput {
                code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            })));
        };
        if let Some(output) = self.stubbed(&script) {
            return Ok(Box::new(Finished(output)));
        }
        let child = self.shell(&script, Stdio::null())?;
        Ok(Box::new(ChildProcess::new("sh", child)))
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &str,
    ) -> Result<CommandOutput, TransportError> {
        let Some(script) = self.record(program, args, Some(input)) else {
            return Ok(CommandOutput {
                code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            });
        };
        if let Some(output) = self.stubbed(&script) {
            return Ok(output);
        }
        let child = self.shell(&script, Stdio::piped())?;
        ChildProcess::new("sh", child).wait_with_input(input)
    }
}

/// Transport configuration suitable for test runners: no identity file and
/// multiplexing disabled.
#[must_use]
pub fn test_transport_config() -> TransportConfig {
    TransportConfig {
        ssh_bin: String::from("ssh"),
        ssh_user: String::from("root"),
        ssh_port: 22,
        ssh_batch_mode: true,
        ssh_strict_host_key_checking: false,
        ssh_known_hosts_file: String::from("/dev/null"),
        ssh_identity_file: None,
        ssh_control_path: String::new(),
        ssh_control_persist_secs: 300,
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

/// Produces a payload matching `scw instance server list -o json`.
///
/// Each tuple is `(id, name, state, public_ip)`.
#[must_use]
pub fn json_servers(servers: &[(&str, &str, &str, Option<&str>)]) -> String {
    let items = servers
        .iter()
        .map(|(id, name, state, ip)| json_server(id, name, state, *ip))
        .collect::<Vec<_>>()
        .join(",");
    format!("[{items}]")
}

/// Produces a single server object as printed by `scw instance server create -o json`.
#[must_use]
pub fn json_server(id: &str, name: &str, state: &str, public_ip: Option<&str>) -> String {
    let ip = public_ip.map_or_else(
        || String::from("null"),
        |address| format!("{{\"address\":\"{address}\"}}"),
    );
    format!(
        "{{\"id\":\"{id}\",\"name\":\"{name}\",\"zone\":\"fr-par-1\",\"state\":\"{state}\",\"public_ip\":{ip}}}"
    )
}
