//! SSH transport to a single remote host.
//!
//! Commands run through the system `ssh` client with connection
//! multiplexing, so every issued command gets its own channel over one
//! authenticated session. Several commands may therefore be in flight at
//! once without sharing a channel. File operations are layered on top as
//! small shell helpers (see [`FileChannel`]).

use std::ffi::OsString;

use tracing::{debug, warn};

mod config;
mod error;
mod file_channel;
mod types;
mod util;

pub use config::{DEFAULT_CONTROL_PATH, TransportConfig, TransportConfigLoadError};
pub use error::TransportError;
pub use file_channel::{FileChannel, MISSING_STATUS};
pub use types::{
    ChildProcess, CommandOutput, CommandResult, CommandRunner, FileKind, PendingCommand,
    ProcessCommandRunner, RunningCommand, SSH_FAILURE_STATUS,
};
pub use util::expand_tilde;

/// Command used to establish and check the connection.
const PROBE_COMMAND: &str = "true";

/// A remote shell able to run commands and expose a file channel.
pub trait Transport {
    /// Issues `command` without waiting for it to finish.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the command cannot be issued.
    fn start(&self, command: &str) -> Result<PendingCommand, TransportError>;

    /// Runs `command` to completion, capturing stdout and stderr separately.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on connection or channel failure. A
    /// non-zero exit code is not an error.
    fn run_command(&self, command: &str) -> Result<CommandResult, TransportError> {
        self.start(command)?.wait()
    }

    /// Runs `command` to completion with `input` on its standard input.
    ///
    /// Bulk data travels this way rather than inside the command text, which
    /// is bounded by the operating system's argument size limit.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on connection or channel failure. A
    /// non-zero exit code is not an error.
    fn run_with_input(&self, command: &str, input: &str) -> Result<CommandResult, TransportError>;

    /// Opens a file channel over this transport.
    fn file_channel(&self) -> FileChannel<'_, Self> {
        FileChannel::new(self)
    }
}

/// Transport backed by the system `ssh` client.
#[derive(Clone, Debug)]
pub struct SshTransport<R: CommandRunner> {
    config: TransportConfig,
    runner: R,
    host: String,
}

impl SshTransport<ProcessCommandRunner> {
    /// Connects to `host` using the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfig`] or
    /// [`TransportError::Connection`].
    pub fn connect_with_process_runner(
        config: TransportConfig,
        host: impl Into<String>,
    ) -> Result<Self, TransportError> {
        Self::connect(config, ProcessCommandRunner, host)
    }
}

impl<R: CommandRunner> SshTransport<R> {
    /// Validates `config`, then opens the session by running a probe command.
    ///
    /// With multiplexing enabled the probe leaves a master connection behind
    /// that later commands reuse.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfig`] when validation fails and
    /// [`TransportError::Connection`] when the probe does not succeed.
    pub fn connect(
        config: TransportConfig,
        runner: R,
        host: impl Into<String>,
    ) -> Result<Self, TransportError> {
        config.validate()?;
        let transport = Self {
            config,
            runner,
            host: host.into(),
        };
        transport.probe()?;
        debug!(destination = %transport.destination(), "ssh session established");
        Ok(transport)
    }

    /// Returns a reference to the underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Returns the runner used to spawn `ssh`.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Returns `user@host` for this session.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.config.ssh_user, self.host)
    }

    /// Asks the multiplexing master to exit. Failures are logged and
    /// otherwise ignored; the master also exits on its own after
    /// `ssh_control_persist_secs`.
    pub fn close(self) {
        if !self.config.multiplexing_enabled() {
            return;
        }
        let mut args = self.common_ssh_options();
        args.push(OsString::from("-O"));
        args.push(OsString::from("exit"));
        args.push(OsString::from(self.destination()));
        match self.runner.run(&self.config.ssh_bin, &args) {
            Ok(output) if output.is_success() => {
                debug!(destination = %self.destination(), "ssh session closed");
            }
            Ok(output) => {
                warn!(destination = %self.destination(), stderr = %output.stderr.trim(), "ssh master did not exit cleanly");
            }
            Err(err) => warn!(error = %err, "failed to close ssh master"),
        }
    }

    fn probe(&self) -> Result<(), TransportError> {
        let args = self.build_ssh_args(PROBE_COMMAND);
        let output = self
            .runner
            .run(&self.config.ssh_bin, &args)
            .map_err(|err| TransportError::Connection {
                destination: self.destination(),
                stderr: err.to_string(),
            })?;
        if output.is_success() {
            return Ok(());
        }
        Err(TransportError::Connection {
            destination: self.destination(),
            stderr: output.stderr.trim().to_owned(),
        })
    }

    fn build_ssh_args(&self, remote_command: &str) -> Vec<OsString> {
        let mut args = self.common_ssh_options();
        args.push(OsString::from(self.destination()));
        args.push(OsString::from(remote_command));
        args
    }

    fn common_ssh_options(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.config.ssh_port.to_string()),
        ];

        if let Some(ref identity_file) = self.config.ssh_identity_file {
            args.push(OsString::from("-i"));
            args.push(OsString::from(expand_tilde(identity_file)));
        }

        if self.config.ssh_batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.ssh_known_hosts_file
            )));
        }

        if self.config.multiplexing_enabled() {
            args.push(OsString::from("-o"));
            args.push(OsString::from("ControlMaster=auto"));
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "ControlPath={}",
                expand_tilde(&self.config.ssh_control_path)
            )));
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "ControlPersist={}",
                self.config.ssh_control_persist_secs
            )));
        }

        args
    }
}

impl<R: CommandRunner> Transport for SshTransport<R> {
    fn start(&self, command: &str) -> Result<PendingCommand, TransportError> {
        let args = self.build_ssh_args(command);
        debug!(destination = %self.destination(), command, "issuing remote command");
        let handle = self.runner.spawn(&self.config.ssh_bin, &args)?;
        Ok(PendingCommand::new(command, handle))
    }

    fn run_with_input(&self, command: &str, input: &str) -> Result<CommandResult, TransportError> {
        let args = self.build_ssh_args(command);
        debug!(destination = %self.destination(), command, bytes = input.len(), "issuing remote command with input");
        let output = self
            .runner
            .run_with_input(&self.config.ssh_bin, &args, input)?;
        types::remote_result(command.to_owned(), output)
    }
}

#[cfg(test)]
mod tests;
