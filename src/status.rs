//! Execution status shared by commands, groups and completion records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a command or command group.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Not issued yet.
    #[default]
    NotExecuted,
    /// Issued and not yet joined.
    Executing,
    /// Exited zero, or skipped because a completion record exists.
    Done,
    /// Exited non-zero or lost its channel.
    Failed,
    /// Never issued because something it depends on failed or was canceled.
    Canceled,
}

impl Status {
    /// Returns `true` for [`Status::NotExecuted`].
    #[must_use]
    pub const fn is_not_executed(self) -> bool {
        matches!(self, Self::NotExecuted)
    }

    /// Returns `true` for [`Status::Executing`].
    #[must_use]
    pub const fn is_executing(self) -> bool {
        matches!(self, Self::Executing)
    }

    /// Returns `true` for [`Status::Done`].
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns `true` for [`Status::Failed`].
    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Returns `true` for [`Status::Canceled`].
    #[must_use]
    pub const fn is_canceled(self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Returns `true` for `Done`, `Failed` and `Canceled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Canceled)
    }

    /// Lowercase label used in logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotExecuted => "not_executed",
            Self::Executing => "executing",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
