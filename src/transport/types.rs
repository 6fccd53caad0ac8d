//! Process runner abstraction and the result types passed up to the engine.

use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::thread;

use super::TransportError;

/// Exit status `ssh` reserves for its own failures (connection refused,
/// authentication failure, dropped channel).
pub const SSH_FAILURE_STATUS: i32 = 255;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Outcome of a remote command that reached the host and exited.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandResult {
    /// Exit code of the remote command.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandResult {
    /// Returns `true` when the remote command exited zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A process that has been started but not yet reaped.
pub trait RunningCommand {
    /// Blocks until the process exits and returns its captured output.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] when the process cannot be waited on.
    fn wait(self: Box<Self>) -> Result<CommandOutput, TransportError>;
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, TransportError>;

    /// Starts `program` without waiting for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] if the command cannot be started.
    fn spawn(
        &self,
        program: &str,
        args: &[OsString],
    ) -> Result<Box<dyn RunningCommand>, TransportError>;

    /// Runs `program` with `input` fed to its standard input.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] if the command cannot be started or
    /// its input cannot be delivered.
    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &str,
    ) -> Result<CommandOutput, TransportError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, TransportError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| TransportError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn spawn(
        &self,
        program: &str,
        args: &[OsString],
    ) -> Result<Box<dyn RunningCommand>, TransportError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| TransportError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(Box::new(ChildProcess {
            program: program.to_owned(),
            child,
        }))
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[OsString],
        input: &str,
    ) -> Result<CommandOutput, TransportError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| TransportError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        ChildProcess::new(program, child).wait_with_input(input)
    }
}

/// A spawned child process with piped output.
#[derive(Debug)]
pub struct ChildProcess {
    program: String,
    child: Child,
}

impl ChildProcess {
    /// Wraps an already spawned child whose stdout and stderr are piped.
    #[must_use]
    pub fn new(program: impl Into<String>, child: Child) -> Self {
        Self {
            program: program.into(),
            child,
        }
    }

    /// Writes `input` to the child's standard input, closes it and waits.
    ///
    /// The input is written from a separate thread while the output pipes
    /// are drained, so a chatty child cannot stall the writer. The child
    /// must have been spawned with stdin piped.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] when the child cannot be waited on,
    /// or when the input could not be delivered and the child still exited
    /// zero.
    pub fn wait_with_input(mut self, input: &str) -> Result<CommandOutput, TransportError> {
        let stdin = self.child.stdin.take();
        let program = self.program;
        let child = self.child;
        let spawn_error = |message: String| TransportError::Spawn {
            program: program.clone(),
            message,
        };

        let (output, written) = thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut pipe) => pipe.write_all(input.as_bytes()),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (output, written)
        });

        let output = output.map_err(|err| spawn_error(err.to_string()))?;
        if let Err(err) = written
            && output.status.success()
        {
            return Err(spawn_error(format!("failed to write stdin: {err}")));
        }

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl RunningCommand for ChildProcess {
    fn wait(self: Box<Self>) -> Result<CommandOutput, TransportError> {
        let program = self.program;
        let output = self
            .child
            .wait_with_output()
            .map_err(|err| TransportError::Spawn {
                program,
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// A remote command issued over the transport and not yet joined.
pub struct PendingCommand {
    command: String,
    handle: Box<dyn RunningCommand>,
}

impl PendingCommand {
    /// Wraps a running process that executes `command` remotely.
    #[must_use]
    pub fn new(command: impl Into<String>, handle: Box<dyn RunningCommand>) -> Self {
        Self {
            command: command.into(),
            handle,
        }
    }

    /// Returns the remote command text.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Waits for the remote command to exit.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Channel`] when `ssh` itself failed and
    /// [`TransportError::Terminated`] when no exit status was reported.
    pub fn wait(self) -> Result<CommandResult, TransportError> {
        let output = self.handle.wait()?;
        remote_result(self.command, output)
    }
}

/// Interprets the output of an `ssh` process that ran `command`.
///
/// # Errors
///
/// Returns [`TransportError::Channel`] when `ssh` itself failed and
/// [`TransportError::Terminated`] when no exit status was reported.
pub(super) fn remote_result(
    command: String,
    output: CommandOutput,
) -> Result<CommandResult, TransportError> {
    match output.code {
        None => Err(TransportError::Terminated { command }),
        Some(SSH_FAILURE_STATUS) => Err(TransportError::Channel {
            command,
            stderr: output.stderr,
        }),
        Some(exit_code) => Ok(CommandResult {
            exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        }),
    }
}

impl fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCommand")
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

/// Kind of filesystem entry reported by the file channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileKind {
    /// A regular file (or anything that is not a directory).
    File,
    /// A directory.
    Directory,
}
