//! Task identity and the per-task shared record.
//!
//! A [`TaskNode`] is the single source of truth for one task: state, children,
//! cancellation token, stored result, and registered completion callbacks.
//! Handles, contexts, and the tree all share it through an `Arc`.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::core::Lane;
use crate::error::TaskError;
use crate::scopes::ScopeShared;

use super::{CancelReason, TaskState};

/// Unique identifier for a task within one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Terminal outcome of a task, as seen by completion callbacks.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Body returned a value and every child settled.
    Completed,
    /// Ended by cancellation, with the winning reason.
    Cancelled(CancelReason),
    /// Ended with an error (body error, panic, or dependency).
    Failed(TaskError),
}

/// Callback registered through `invoke_on_completion`.
///
/// Runs exactly once, synchronously with the terminal transition.
pub(crate) type CompletionCallback = Box<dyn FnOnce(&Outcome) + Send + 'static>;

/// Mutable half of a task record, guarded by the node's lock.
pub(crate) struct NodeInner {
    pub(crate) state: TaskState,
    pub(crate) children: Vec<TaskId>,
    pub(crate) cancel_reason: Option<CancelReason>,
    pub(crate) value: Option<Box<dyn Any + Send>>,
    pub(crate) error: Option<TaskError>,
    pub(crate) callbacks: Vec<CompletionCallback>,
}

impl NodeInner {
    fn new() -> Self {
        Self {
            state: TaskState::Active,
            children: Vec::new(),
            cancel_reason: None,
            value: None,
            error: None,
            callbacks: Vec::new(),
        }
    }

    /// Outcome snapshot, present only once the state is terminal.
    pub(crate) fn terminal_outcome(&self) -> Option<Outcome> {
        match self.state {
            TaskState::Completed => Some(Outcome::Completed),
            TaskState::Cancelled => Some(Outcome::Cancelled(
                self.cancel_reason
                    .clone()
                    .unwrap_or_else(CancelReason::parent),
            )),
            TaskState::Failed => Some(Outcome::Failed(
                self.error
                    .clone()
                    .unwrap_or_else(|| TaskError::failed("unrecorded failure")),
            )),
            _ => None,
        }
    }
}

/// Shared record of one task in the tree.
pub(crate) struct TaskNode {
    pub(crate) id: TaskId,
    pub(crate) scope: Arc<ScopeShared>,
    pub(crate) parent: Option<TaskId>,
    pub(crate) lane: Lane,
    /// Child of the parent's token (or the scope's, for roots); cancelling a
    /// parent token cascades here synchronously.
    pub(crate) token: CancellationToken,
    pub(crate) inner: Mutex<NodeInner>,
    done: Notify,
    children_settled: Notify,
}

impl TaskNode {
    pub(crate) fn new(
        id: TaskId,
        scope: Arc<ScopeShared>,
        parent: Option<TaskId>,
        lane: Lane,
        token: CancellationToken,
    ) -> Self {
        Self {
            id,
            scope,
            parent,
            lane,
            token,
            inner: Mutex::new(NodeInner::new()),
            done: Notify::new(),
            children_settled: Notify::new(),
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        self.inner.lock().state
    }

    /// `true` once any cancellation request has reached this task, whether or
    /// not the body has observed it yet.
    pub(crate) fn cancel_requested(&self) -> bool {
        if self.token.is_cancelled() {
            return true;
        }
        self.inner.lock().cancel_reason.is_some()
    }

    /// The reason a checkpoint should raise, if one is pending.
    ///
    /// A cancelled token without a recorded reason can occur when the token
    /// was born from an already-cancelled parent; the parent kind stands in.
    pub(crate) fn pending_cancel(&self) -> Option<CancelReason> {
        if let Some(reason) = self.inner.lock().cancel_reason.clone() {
            return Some(reason);
        }
        if self.token.is_cancelled() {
            return Some(CancelReason::parent());
        }
        None
    }

    pub(crate) fn cancel_reason_or(&self, fallback: CancelReason) -> CancelReason {
        self.inner.lock().cancel_reason.clone().unwrap_or(fallback)
    }

    pub(crate) fn terminal_outcome(&self) -> Option<Outcome> {
        self.inner.lock().terminal_outcome()
    }

    pub(crate) fn child_count(&self) -> usize {
        self.inner.lock().children.len()
    }

    pub(crate) fn has_live_children(&self) -> bool {
        !self.inner.lock().children.is_empty()
    }

    pub(crate) fn remove_child(&self, id: TaskId) {
        self.inner.lock().children.retain(|c| *c != id);
    }

    pub(crate) fn notify_terminal(&self) {
        self.done.notify_waiters();
    }

    pub(crate) fn notify_child_settled(&self) {
        self.children_settled.notify_waiters();
    }

    /// Resolves once the task reaches a terminal state.
    ///
    /// The waiter is registered before the state check, so a transition
    /// landing between check and await is never missed.
    pub(crate) async fn wait_terminal(&self) {
        loop {
            let notified = self.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.state().is_terminal() {
                return;
            }
            notified.await;
        }
    }

    /// Resolves once every child has settled and detached.
    pub(crate) async fn wait_children_settled(&self) {
        loop {
            let notified = self.children_settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.has_live_children() {
                return;
            }
            notified.await;
        }
    }

    /// `scope:id:state` description for shutdown reports.
    pub(crate) fn describe(&self) -> String {
        format!("{}:{}:{}", self.scope.name, self.id, self.state())
    }
}
