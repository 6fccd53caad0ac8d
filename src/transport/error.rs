//! Errors raised by the SSH transport and its file channel.

use thiserror::Error;

/// Errors surfaced while talking to the remote host.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransportError {
    /// Raised when configuration is missing required values. The message
    /// names the environment variable and configuration key to set.
    #[error("missing {field}: set DROPSHIP_{env_suffix} or add {field} to dropship.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Raised when a local process cannot be spawned or reaped.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the initial connection to the host fails.
    #[error("could not connect to {destination}: {stderr}")]
    Connection {
        /// `user@host` the transport tried to reach.
        destination: String,
        /// Diagnostic output from `ssh`.
        stderr: String,
    },
    /// Raised when `ssh` reports a channel failure while a command runs.
    #[error("ssh channel failed while running `{command}`: {stderr}")]
    Channel {
        /// Remote command that was in flight.
        command: String,
        /// Diagnostic output from `ssh`.
        stderr: String,
    },
    /// Raised when the remote command ends without an exit status.
    #[error("remote command `{command}` terminated without an exit status")]
    Terminated {
        /// Remote command that was in flight.
        command: String,
    },
    /// Raised when a file channel operation fails for a reason other than
    /// the path being absent.
    #[error("file channel {operation} on {path} exited with status {status}: {stderr}")]
    FileChannel {
        /// Operation name (`read`, `write`, `mkdir`, ...).
        operation: &'static str,
        /// Remote path involved.
        path: String,
        /// Exit code of the remote helper.
        status: i32,
        /// Captured stderr.
        stderr: String,
    },
    /// Raised when a glob pattern contains characters the file channel does
    /// not pass to the remote shell.
    #[error("unsupported glob pattern: {pattern}")]
    InvalidPattern {
        /// Offending pattern.
        pattern: String,
    },
    /// Raised when a local file cannot be read for upload.
    #[error("failed to read local file {path}: {message}")]
    LocalFile {
        /// Local path.
        path: String,
        /// Operating system error string.
        message: String,
    },
}
