//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//! This is primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [scope-opened] scope=pipeline
//! [launched] scope=pipeline task=#1 lane=cpu
//! [completed] scope=pipeline task=#1 lane=cpu
//! [cancelled] scope=pipeline task=#2 lane=io reason="parent task canceled"
//! [failed] scope=pipeline task=#3 lane=cpu err="disk full"
//! [shutdown-requested]
//! [all-stopped-within-grace]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Prints human-readable event descriptions
/// to stdout for debugging and demonstration purposes.
///
/// Not intended for production use - implement a custom [`Subscribe`] for
/// structured logging or metrics collection.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, event: &Event) {
        let tag = match event.kind {
            EventKind::ScopeOpened => "scope-opened",
            EventKind::ScopeCancelled => "scope-cancelled",
            EventKind::TaskLaunched => "launched",
            EventKind::TaskCompleted => "completed",
            EventKind::TaskCancelled => "cancelled",
            EventKind::TaskFailed => "failed",
            EventKind::FailureSuppressed => "suppressed",
            EventKind::CallbackPanicked => "callback-panicked",
            EventKind::ShutdownRequested => "shutdown-requested",
            EventKind::AllStoppedWithin => "all-stopped-within-grace",
            EventKind::GraceExceeded => "grace-exceeded",
            EventKind::SubscriberOverflow => "subscriber-overflow",
            EventKind::SubscriberPanicked => "subscriber-panicked",
        };

        let mut line = format!("[{tag}]");
        if let Some(scope) = &event.scope {
            line.push_str(&format!(" scope={scope}"));
        }
        if let Some(task) = event.task {
            line.push_str(&format!(" task={task}"));
        }
        if let Some(lane) = &event.lane {
            line.push_str(&format!(" lane={lane}"));
        }
        if let Some(reason) = &event.reason {
            match event.kind {
                EventKind::TaskFailed | EventKind::FailureSuppressed => {
                    line.push_str(&format!(" err={reason:?}"));
                }
                _ => line.push_str(&format!(" reason={reason:?}")),
            }
        }
        println!("{line}");
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
