//! Error types used by the taskgrove engine and tasks.
//!
//! This module defines two main error enums:
//!
//! - [`RuntimeError`] — errors raised by the engine itself (lane construction,
//!   shutdown sequencing).
//! - [`TaskError`] — errors raised by individual task executions and re-raised
//!   through handles when a waiter awaits a task that did not complete.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for
//! logging/metrics. Cancellation is modeled as an outcome, not a bug:
//! [`TaskError::Canceled`] carries a structured [`CancelReason`] so observers
//! can tell a user cancel from a scope teardown without parsing strings.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::tree::{CancelReason, TaskId};

/// # Errors produced by the taskgrove engine.
///
/// These represent failures in the orchestration machinery itself,
/// such as a shutdown sequence exceeding its grace period or a lane
/// whose runtime could not be built.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some tasks remained live and had to be force-terminated.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Descriptions (`scope:id:state`) of the tasks still live.
        stuck: Vec<String>,
    },

    /// A lane's dedicated runtime could not be constructed.
    #[error("lane '{lane}' failed to build: {source}")]
    LaneBuild {
        /// Label of the lane that failed.
        lane: Arc<str>,
        /// Underlying runtime construction error.
        #[source]
        source: std::io::Error,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskgrove::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::LaneBuild { .. } => "runtime_lane_build",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck tasks={stuck:?}")
            }
            RuntimeError::LaneBuild { lane, source } => {
                format!("lane '{lane}' unavailable: {source}")
            }
        }
    }
}

/// # Errors produced by task execution.
///
/// These represent terminal outcomes of individual tasks managed by the
/// engine. A body returns `Err(TaskError)` to fail; checkpoints return
/// [`TaskError::Canceled`] once cancellation has been requested; panics are
/// caught and normalized into [`TaskError::Panicked`].
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// Task observed a cancellation request at a checkpoint and stopped.
    #[error("canceled: {0}")]
    Canceled(CancelReason),

    /// Task body returned an application error.
    #[error("execution failed: {message}")]
    Failed {
        /// The underlying error message.
        message: Arc<str>,
    },

    /// Task body panicked; the payload was captured off the worker thread.
    #[error("panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text, when it was a string.
        message: Arc<str>,
    },

    /// An awaited task did not produce a value because it reached a
    /// non-completed terminal state first.
    #[error("dependency {task} failed: {source}")]
    Dependency {
        /// Identifier of the awaited task.
        task: TaskId,
        /// The awaited task's own terminal error.
        #[source]
        source: Box<TaskError>,
    },
}

impl TaskError {
    /// Builds a [`TaskError::Failed`] from any message.
    #[inline]
    pub fn failed(message: impl Into<Arc<str>>) -> Self {
        TaskError::Failed {
            message: message.into(),
        }
    }

    /// Builds a [`TaskError::Panicked`] from a rendered panic payload.
    #[inline]
    pub fn panicked(message: impl Into<Arc<str>>) -> Self {
        TaskError::Panicked {
            message: message.into(),
        }
    }

    /// Wraps the terminal error of an awaited task.
    #[inline]
    pub fn dependency(task: TaskId, source: TaskError) -> Self {
        TaskError::Dependency {
            task,
            source: Box::new(source),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskgrove::TaskError;
    ///
    /// let err = TaskError::failed("boom");
    /// assert_eq!(err.as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Canceled(_) => "task_canceled",
            TaskError::Failed { .. } => "task_failed",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::Dependency { .. } => "task_dependency",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Canceled(reason) => format!("canceled: {reason}"),
            TaskError::Failed { message } => format!("error: {message}"),
            TaskError::Panicked { message } => format!("panic: {message}"),
            TaskError::Dependency { task, source } => {
                format!("dependency {task}: {}", source.as_message())
            }
        }
    }

    /// Indicates whether this error is a cancellation, directly or through a
    /// dependency chain.
    ///
    /// Waiters use this to tell "the thing I awaited was stopped" apart from
    /// "the thing I awaited broke".
    ///
    /// # Example
    /// ```
    /// use taskgrove::{CancelReason, TaskError, TaskId};
    ///
    /// let direct = TaskError::Canceled(CancelReason::user());
    /// assert!(direct.is_cancellation());
    ///
    /// let wrapped = TaskError::dependency(TaskId(3), direct);
    /// assert!(wrapped.is_cancellation());
    ///
    /// let plain = TaskError::failed("boom");
    /// assert!(!plain.is_cancellation());
    /// ```
    pub fn is_cancellation(&self) -> bool {
        match self {
            TaskError::Canceled(_) => true,
            TaskError::Dependency { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(TaskError::failed("boom").as_label(), "task_failed");
        assert_eq!(TaskError::panicked("boom").as_label(), "task_panicked");
        assert_eq!(
            TaskError::Canceled(CancelReason::shutdown()).as_label(),
            "task_canceled"
        );
        let dep = TaskError::dependency(TaskId(7), TaskError::failed("boom"));
        assert_eq!(dep.as_label(), "task_dependency");
    }

    #[test]
    fn test_cancellation_detected_through_dependency_chain() {
        let nested = TaskError::dependency(
            TaskId(1),
            TaskError::dependency(TaskId(2), TaskError::Canceled(CancelReason::parent())),
        );
        assert!(nested.is_cancellation());

        let plain = TaskError::dependency(TaskId(3), TaskError::failed("boom"));
        assert!(!plain.is_cancellation());
    }

    #[test]
    fn test_display_mentions_dependency_task() {
        let err = TaskError::dependency(TaskId(42), TaskError::failed("no quota"));
        let text = err.to_string();
        assert!(text.contains("#42"), "got: {text}");
        assert!(text.contains("no quota"), "got: {text}");
    }
}
