//! Structured cancellation causes.
//!
//! Every cancellation request travels with a [`CancelReason`] describing who
//! asked and why. The first reason to reach a task wins; later requests are
//! absorbed without overwriting it, so observers always see the original
//! cause.

use std::fmt;
use std::sync::Arc;

/// Who requested a cancellation.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelKind {
    /// Explicit request through a handle or a task's own context.
    User,
    /// A parent task reached a terminal path and swept its children.
    Parent,
    /// A sibling failed under a fail-fast scope.
    SiblingFailed,
    /// The owning scope was cancelled as a whole.
    Scope,
    /// Engine shutdown swept every scope.
    Shutdown,
}

impl CancelKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CancelKind::User => "user",
            CancelKind::Parent => "parent",
            CancelKind::SiblingFailed => "sibling_failed",
            CancelKind::Scope => "scope",
            CancelKind::Shutdown => "shutdown",
        }
    }
}

/// Why a task is being cancelled: a [`CancelKind`] plus an optional note.
///
/// # Example
/// ```
/// use taskgrove::{CancelKind, CancelReason};
///
/// let reason = CancelReason::user().with_message("operator clicked stop");
/// assert_eq!(reason.kind(), CancelKind::User);
/// assert_eq!(reason.to_string(), "user (operator clicked stop)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    kind: CancelKind,
    message: Option<Arc<str>>,
}

impl CancelReason {
    /// Builds a reason of the given kind with no note attached.
    #[inline]
    pub fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Explicit request through a handle or context.
    #[inline]
    pub fn user() -> Self {
        Self::new(CancelKind::User)
    }

    /// Parent task swept its children on the way to its own terminal state.
    #[inline]
    pub fn parent() -> Self {
        Self::new(CancelKind::Parent)
    }

    /// A sibling failed under a fail-fast scope.
    #[inline]
    pub fn sibling_failed() -> Self {
        Self::new(CancelKind::SiblingFailed)
    }

    /// The owning scope was cancelled as a whole.
    #[inline]
    pub fn scope() -> Self {
        Self::new(CancelKind::Scope)
    }

    /// Engine shutdown swept every scope.
    #[inline]
    pub fn shutdown() -> Self {
        Self::new(CancelKind::Shutdown)
    }

    /// Attaches a free-form note to the reason.
    #[inline]
    pub fn with_message(mut self, message: impl Into<Arc<str>>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// The kind of request.
    #[inline]
    pub fn kind(&self) -> CancelKind {
        self.kind
    }

    /// The attached note, if any.
    #[inline]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{} ({msg})", self.kind.as_label()),
            None => f.write_str(self.kind.as_label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(CancelKind::User.as_label(), "user");
        assert_eq!(CancelKind::SiblingFailed.as_label(), "sibling_failed");
        assert_eq!(CancelKind::Shutdown.as_label(), "shutdown");
    }

    #[test]
    fn test_display_with_and_without_message() {
        assert_eq!(CancelReason::scope().to_string(), "scope");
        assert_eq!(
            CancelReason::parent().with_message("cleanup").to_string(),
            "parent (cleanup)"
        );
    }

    #[test]
    fn test_reasons_compare_by_kind_and_message() {
        assert_eq!(CancelReason::user(), CancelReason::user());
        assert_ne!(
            CancelReason::user(),
            CancelReason::user().with_message("stop")
        );
    }
}
