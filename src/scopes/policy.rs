//! # Scope failure policies.
//!
//! A scope's [`Policy`] decides how far one task's failure reaches:
//!
//! ```text
//! FailFast                        Supervisor
//! ────────                        ──────────
//!      scope                           scope
//!     /  |  \                         /  |  \
//!    A   B!  C      B fails          A   B!  C      B fails
//!    ▼   ▼   ▼                       │   ▼   │
//!  swept ▼ swept                   runs  ▼  runs
//!        handler (once)                handler (per failure)
//! ```
//!
//! Either way, the failing task's own children are always swept before the
//! failure is reported; the policy only controls whether the failure escapes
//! to siblings.

use std::fmt;

/// How a scope reacts when one of its tasks fails.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// The first failure cancels every other task in the scope, then reaches
    /// the failure handler exactly once. Later failures are absorbed and
    /// published as `FailureSuppressed` events.
    #[default]
    FailFast,

    /// Failures stay contained: the failing task settles `Failed`, its
    /// siblings keep running, and every failure reaches the handler.
    Supervisor,
}

impl Policy {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Policy::FailFast => "fail_fast",
            Policy::Supervisor => "supervisor",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_fail_fast() {
        assert_eq!(Policy::default(), Policy::FailFast);
    }

    #[test]
    fn test_labels() {
        assert_eq!(Policy::FailFast.as_label(), "fail_fast");
        assert_eq!(Policy::Supervisor.to_string(), "supervisor");
    }
}
