//! # Shared task arena and lifecycle transitions.
//!
//! Every [`TaskState`] transition in the engine goes through [`TaskTree`];
//! nothing else mutates state. That keeps the ordering guarantees in one
//! place:
//!
//! ```text
//!  cancel_subtree(T)
//!       │
//!       ▼
//!  mark T, then every reachable descendant, Cancelling   (per-node locks,
//!       │                                                 one at a time)
//!       ▼
//!  T.token.cancel()  ── cascades to child tokens, wakes suspended bodies
//! ```
//!
//! ## Rules
//!
//! - Marking precedes tokens: by the time any body wakes from a cancelled
//!   token, its whole subtree already reads `Cancelling`.
//! - [`TaskTree::finalize`] is exactly-once per task. Completion callbacks run
//!   inside it, synchronously with the terminal transition, before waiters
//!   are woken.
//! - Locks are held one node at a time; no path holds a node lock and the
//!   arena map lock together.
//! - The first recorded [`CancelReason`] wins; later requests keep it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::core::EventSink;
use crate::error::TaskError;
use crate::events::{Event, EventKind};

use super::{CancelReason, Outcome, TaskId, TaskNode, TaskState};

/// How a task's driver asks the tree to settle it.
pub(crate) enum Terminal {
    Completed(Box<dyn Any + Send>),
    Cancelled(CancelReason),
    Failed(TaskError),
}

/// Arena of live tasks plus the transition logic that retires them.
pub(crate) struct TaskTree {
    nodes: Mutex<HashMap<TaskId, Arc<TaskNode>>>,
    next_id: AtomicU64,
    quiescent: Notify,
    sink: EventSink,
}

impl TaskTree {
    pub(crate) fn new(sink: EventSink) -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            quiescent: Notify::new(),
            sink,
        }
    }

    pub(crate) fn allocate_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn register(&self, node: Arc<TaskNode>) {
        self.nodes.lock().insert(node.id, node);
    }

    pub(crate) fn get(&self, id: TaskId) -> Option<Arc<TaskNode>> {
        self.nodes.lock().get(&id).cloned()
    }

    /// Number of tasks that have not yet settled.
    pub(crate) fn live_count(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Sorted `scope:id:state` descriptions of every live task.
    pub(crate) fn snapshot(&self) -> Vec<String> {
        let nodes: Vec<Arc<TaskNode>> = self.nodes.lock().values().cloned().collect();
        let mut out: Vec<String> = nodes.iter().map(|n| n.describe()).collect();
        out.sort();
        out
    }

    /// Requests cancellation of `node` and everything below it.
    ///
    /// Walks the subtree first, recording the reason and flipping live states
    /// to `Cancelling`, then fires the token cascade. Idempotent; a subtree
    /// already marked keeps its original reason.
    pub(crate) fn cancel_subtree(&self, node: &Arc<TaskNode>, reason: CancelReason) {
        let mut stack = vec![node.clone()];
        while let Some(n) = stack.pop() {
            let child_ids = {
                let mut inner = n.inner.lock();
                if inner.state.is_terminal() {
                    Vec::new()
                } else {
                    if inner.cancel_reason.is_none() {
                        inner.cancel_reason = Some(reason.clone());
                    }
                    if matches!(inner.state, TaskState::Active | TaskState::Completing) {
                        inner.state = TaskState::Cancelling;
                    }
                    inner.children.clone()
                }
            };
            for id in child_ids {
                if let Some(child) = self.get(id) {
                    stack.push(child);
                }
            }
        }
        node.token.cancel();
    }

    /// Cancels every child subtree while leaving `node` itself unmarked.
    ///
    /// Used by the failure path: the failing task is `Failing`, not
    /// `Cancelling`, but its children are swept.
    pub(crate) fn cancel_children(&self, node: &TaskNode, reason: CancelReason) {
        let child_ids = node.inner.lock().children.clone();
        for id in child_ids {
            if let Some(child) = self.get(id) {
                self.cancel_subtree(&child, reason.clone());
            }
        }
    }

    /// `Active` to `Completing`, refused when a cancel request already landed.
    pub(crate) fn mark_completing(&self, node: &TaskNode) -> bool {
        let mut inner = node.inner.lock();
        if inner.state == TaskState::Active
            && inner.cancel_reason.is_none()
            && !node.token.is_cancelled()
        {
            inner.state = TaskState::Completing;
            true
        } else {
            false
        }
    }

    /// Any live state to `Failing`. An error observed by the body outranks a
    /// concurrent cancellation mark for the recorded end state.
    pub(crate) fn mark_failing(&self, node: &TaskNode) {
        let mut inner = node.inner.lock();
        if inner.state.is_live() {
            inner.state = TaskState::Failing;
        }
    }

    /// Exactly-once terminal transition.
    ///
    /// Records the outcome, runs completion callbacks, publishes the
    /// terminal event, drops the record from the arena, detaches the task
    /// from its parent (or scope roots), and wakes waiters last; a woken
    /// waiter never observes the task still live. Returns `false` when the
    /// task had already settled.
    pub(crate) fn finalize(&self, node: &Arc<TaskNode>, end: Terminal) -> bool {
        let (outcome, callbacks) = {
            let mut inner = node.inner.lock();
            if inner.state.is_terminal() {
                return false;
            }
            let outcome = match end {
                Terminal::Completed(value) => {
                    inner.value = Some(value);
                    inner.state = TaskState::Completed;
                    Outcome::Completed
                }
                Terminal::Cancelled(fallback) => {
                    let reason = inner.cancel_reason.clone().unwrap_or(fallback);
                    inner.cancel_reason = Some(reason.clone());
                    inner.state = TaskState::Cancelled;
                    Outcome::Cancelled(reason)
                }
                Terminal::Failed(error) => {
                    inner.error = Some(error.clone());
                    inner.state = TaskState::Failed;
                    Outcome::Failed(error)
                }
            };
            (outcome, std::mem::take(&mut inner.callbacks))
        };

        for cb in callbacks {
            let guarded = std::panic::AssertUnwindSafe(|| cb(&outcome));
            if std::panic::catch_unwind(guarded).is_err() {
                self.sink.publish(
                    Event::new(EventKind::CallbackPanicked)
                        .with_scope(node.scope.name.clone())
                        .with_task(node.id),
                );
            }
        }

        self.sink.publish(terminal_event(node, &outcome));

        let remaining = {
            let mut nodes = self.nodes.lock();
            nodes.remove(&node.id);
            nodes.len()
        };

        match node.parent {
            Some(parent_id) => {
                if let Some(parent) = self.get(parent_id) {
                    parent.remove_child(node.id);
                    parent.notify_child_settled();
                }
            }
            None => node.scope.detach_root(node.id),
        }

        node.notify_terminal();
        if remaining == 0 {
            self.quiescent.notify_waiters();
        }
        true
    }

    /// Resolves once no live task remains in the arena.
    pub(crate) async fn wait_quiescent(&self) {
        loop {
            let notified = self.quiescent.notified();
            tokio::pin!(notified);
            // Register before checking, or a notify between the check and the
            // first poll would be lost.
            notified.as_mut().enable();
            if self.live_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

fn terminal_event(node: &TaskNode, outcome: &Outcome) -> Event {
    let base = Event::new(match outcome {
        Outcome::Completed => EventKind::TaskCompleted,
        Outcome::Cancelled(_) => EventKind::TaskCancelled,
        Outcome::Failed(_) => EventKind::TaskFailed,
    })
    .with_scope(node.scope.name.clone())
    .with_task(node.id)
    .with_lane(node.lane.as_label());

    match outcome {
        Outcome::Completed => base,
        Outcome::Cancelled(reason) => base.with_reason(reason.to_string()),
        Outcome::Failed(error) => base.with_reason(error.as_message()),
    }
}
