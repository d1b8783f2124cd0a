//! Task lifecycle states.
//!
//! ```text
//!             body returns Ok          children settled
//!   Active ────────────────► Completing ──────────────► Completed
//!     │                          │
//!     │ cancel requested         │ cancel requested
//!     ▼                          ▼              children settled
//!   Cancelling ◄────────────────┘ ─────────────────────► Cancelled
//!     │
//!     │ body returns Err / panics
//!     ▼                                         children settled
//!   Failing ────────────────────────────────────────────► Failed
//! ```
//!
//! ## Rules
//!
//! - Terminal states ([`Completed`](TaskState::Completed),
//!   [`Cancelled`](TaskState::Cancelled), [`Failed`](TaskState::Failed)) are
//!   final; no transition leaves them.
//! - A task only reaches a terminal state after every child has reached one.
//! - Cancellation requested while `Completing` discards the completion:
//!   the task ends `Cancelled` and its value is dropped.

use std::fmt;

/// Lifecycle state of a single task in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Body is running (or queued to run) and no stop was requested.
    Active,
    /// Body returned a value; waiting for children to settle.
    Completing,
    /// Cancellation requested; body or children still winding down.
    Cancelling,
    /// Body failed; children are being swept before the failure is reported.
    Failing,
    /// Finished with a value, every child settled.
    Completed,
    /// Ended by cancellation.
    Cancelled,
    /// Ended with an error.
    Failed,
}

impl TaskState {
    /// `true` once the task has settled and will never change state again.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Failed
        )
    }

    /// `true` while the task still occupies the tree.
    #[inline]
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskState::Active => "active",
            TaskState::Completing => "completing",
            TaskState::Cancelling => "cancelling",
            TaskState::Failing => "failing",
            TaskState::Completed => "completed",
            TaskState::Cancelled => "cancelled",
            TaskState::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_partition() {
        let live = [
            TaskState::Active,
            TaskState::Completing,
            TaskState::Cancelling,
            TaskState::Failing,
        ];
        let settled = [TaskState::Completed, TaskState::Cancelled, TaskState::Failed];

        for s in live {
            assert!(s.is_live(), "{s} should be live");
            assert!(!s.is_terminal());
        }
        for s in settled {
            assert!(s.is_terminal(), "{s} should be terminal");
            assert!(!s.is_live());
        }
    }

    #[test]
    fn test_labels_match_display() {
        assert_eq!(TaskState::Cancelling.to_string(), "cancelling");
        assert_eq!(TaskState::Completed.as_label(), "completed");
    }
}
