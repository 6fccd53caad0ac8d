//! Errors raised while driving commands and groups.

use thiserror::Error;

use crate::store::StoreError;
use crate::transport::TransportError;

use super::{NodeId, TemplateError};

/// Errors surfaced by the execution engine.
///
/// Cancellation is not an error: a command whose dependency failed reaches
/// [`crate::Status::Canceled`] and the call succeeds.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The remote command exited non-zero. The completion record is not
    /// written, so a later run retries the same command.
    #[error("command `{command}` exited with status {exit_code}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}")]
    CommandFailed {
        /// Resolved command text.
        command: String,
        /// Remote exit code.
        exit_code: i32,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
    /// The dependency has not been executed yet; the caller drove the graph
    /// out of order.
    #[error("cannot execute `{command}` before its dependency `{dependency}` has run")]
    DependencyNotYetRun {
        /// Template or group name being executed.
        command: String,
        /// Template or group name of the dependency.
        dependency: String,
    },
    /// The dependency is still in flight.
    #[error("cannot execute `{command}` while its dependency `{dependency}` is still running")]
    DependencyStillRunning {
        /// Template or group name being executed.
        command: String,
        /// Template or group name of the dependency.
        dependency: String,
    },
    /// The command was executed again with parameters that resolve to a
    /// different text.
    #[error("command already bound to `{bound}`; create a new command for `{requested}`")]
    ResolvedTextChanged {
        /// Text bound by the first execution.
        bound: String,
        /// Text the new parameters produce.
        requested: String,
    },
    /// A node id does not belong to the graph it was used with.
    #[error("unknown {0}")]
    UnknownNode(NodeId),
    /// The template could not be resolved.
    #[error(transparent)]
    Template(#[from] TemplateError),
    /// The completion store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The transport failed while issuing or joining the command.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
