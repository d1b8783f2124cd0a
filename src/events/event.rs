//! # Engine events emitted by scopes, task drivers, and shutdown.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Subscriber events**: delivery faults inside the fan-out layer
//! - **Shutdown events**: signal observation and grace accounting
//! - **Scope events**: scope creation and teardown
//! - **Task lifecycle events**: launch and the three terminal outcomes
//!
//! The [`Event`] struct carries optional metadata: owning scope, task id,
//! lane label, and a human-readable reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.
//!
//! ## Example
//! ```rust
//! use taskgrove::{Event, EventKind, TaskId};
//!
//! let ev = Event::new(EventKind::TaskFailed)
//!     .with_scope("ingest")
//!     .with_task(TaskId(7))
//!     .with_lane("cpu")
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::TaskFailed);
//! assert_eq!(ev.task, Some(TaskId(7)));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::tree::TaskId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of engine events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `reason`: subscriber name and panic info
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `reason`: subscriber name and cause (e.g., "full", "closed")
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    SubscriberOverflow,

    /// A completion callback panicked; the panic was contained.
    ///
    /// Sets:
    /// - `scope`: owning scope name
    /// - `task`: task id
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    CallbackPanicked,

    // === Shutdown events ===
    /// Shutdown requested (OS signal observed or `shutdown()` called).
    ///
    /// Sets:
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ShutdownRequested,

    /// All tasks settled within the configured grace period.
    ///
    /// Sets:
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    AllStoppedWithin,

    /// Grace period exceeded; some tasks did not settle in time.
    ///
    /// Sets:
    /// - `reason`: stuck task descriptions
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    GraceExceeded,

    // === Scope events ===
    /// A scope was built and can accept submissions.
    ///
    /// Sets:
    /// - `scope`: scope name
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ScopeOpened,

    /// A scope was cancelled; every root under it was swept.
    ///
    /// Sets:
    /// - `scope`: scope name
    /// - `reason`: cancellation cause
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ScopeCancelled,

    // === Task lifecycle events ===
    /// Task registered in the tree and handed to its lane.
    ///
    /// Sets:
    /// - `scope`: owning scope name
    /// - `task`: task id
    /// - `lane`: lane label
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    TaskLaunched,

    /// Task completed with a value, every child settled.
    ///
    /// Sets:
    /// - `scope`: owning scope name
    /// - `task`: task id
    /// - `lane`: lane label
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    TaskCompleted,

    /// Task ended by cancellation.
    ///
    /// Sets:
    /// - `scope`: owning scope name
    /// - `task`: task id
    /// - `lane`: lane label
    /// - `reason`: winning cancellation cause
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    TaskCancelled,

    /// Task ended with an error (body error, panic, or dependency).
    ///
    /// Sets:
    /// - `scope`: owning scope name
    /// - `task`: task id
    /// - `lane`: lane label
    /// - `reason`: failure message
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    TaskFailed,

    /// A failure arrived after a fail-fast scope had already tripped; it was
    /// absorbed instead of re-raised to the handler.
    ///
    /// Sets:
    /// - `scope`: owning scope name
    /// - `task`: task id
    /// - `reason`: suppressed failure message
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    FailureSuppressed,
}

/// Engine event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,

    /// Event classification.
    pub kind: EventKind,
    /// Name of the owning scope, if applicable.
    pub scope: Option<Arc<str>>,
    /// Task id, if applicable.
    pub task: Option<TaskId>,
    /// Lane label, if applicable.
    pub lane: Option<Arc<str>>,
    /// Human-readable reason (cancellation causes, errors, overflow details).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            scope: None,
            task: None,
            lane: None,
            reason: None,
        }
    }

    /// Attaches the owning scope's name.
    #[inline]
    pub fn with_scope(mut self, scope: impl Into<Arc<str>>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Attaches a task id.
    #[inline]
    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    /// Attaches a lane label.
    #[inline]
    pub fn with_lane(mut self, lane: impl Into<Arc<str>>) -> Self {
        self.lane = Some(lane.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, cause: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} cause={cause}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} panic={info}"))
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::ScopeOpened);
        let b = Event::new(EventKind::ScopeOpened);
        let c = Event::new(EventKind::ScopeCancelled);
        assert!(a.seq < b.seq);
        assert!(b.seq < c.seq);
    }

    #[test]
    fn test_builders_set_fields() {
        let ev = Event::new(EventKind::TaskCancelled)
            .with_scope("work")
            .with_task(TaskId(3))
            .with_lane("single:db")
            .with_reason("scope");
        assert_eq!(ev.scope.as_deref(), Some("work"));
        assert_eq!(ev.task, Some(TaskId(3)));
        assert_eq!(ev.lane.as_deref(), Some("single:db"));
        assert_eq!(ev.reason.as_deref(), Some("scope"));
    }

    #[test]
    fn test_subscriber_event_constructors() {
        let over = Event::subscriber_overflow("log", "full");
        assert!(over.is_subscriber_overflow());
        assert!(over.reason.as_deref().unwrap_or("").contains("full"));

        let panicked = Event::subscriber_panicked("log", "boom".to_string());
        assert!(panicked.is_subscriber_panic());
    }
}
