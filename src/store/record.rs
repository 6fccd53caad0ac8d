//! Persisted proof that a resolved command exited zero.

use serde::{Deserialize, Serialize};

use crate::status::Status;

/// Completion record for a single resolved command.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CompletionRecord {
    /// Fully resolved command text.
    pub resolved_text: String,
    /// Status at the time the record was written; always `done` for records
    /// written by the engine.
    pub status: Status,
    /// Exit code of the run.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}
