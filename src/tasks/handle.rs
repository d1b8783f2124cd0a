//! # Awaitable handles to submitted tasks.
//!
//! [`TaskHandle`] observes and controls one task; [`ResultHandle`] adds a
//! typed, single-shot result value on top.
//!
//! ## Rules
//! - `join(cx)` is a checkpoint for the **waiter**: it raises `Canceled` when
//!   the waiter is cancelled while waiting. The awaited task keeps running
//!   unless it is a child of the waiter.
//! - Awaiting a task that failed re-raises [`TaskError::Dependency`];
//!   awaiting one that was cancelled raises [`TaskError::Canceled`] with the
//!   task's own reason.
//! - The result value is single-shot: the first successful `join`/`wait`
//!   takes it, later takers observe an error. Clones share the same slot.
//! - Joining an ancestor of the waiting task deadlocks: the ancestor cannot
//!   settle before the waiter has.
//!
//! ## Example
//! ```
//! use taskgrove::{join_all, Engine, TaskError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::builder().build()?;
//! let scope = engine.scope("math").build();
//!
//! let total = scope.spawn(|cx| async move {
//!     let a = cx.spawn(|cx| async move {
//!         cx.checkpoint()?;
//!         Ok::<i32, TaskError>(3)
//!     })?;
//!     let b = cx.spawn(|cx| async move {
//!         cx.checkpoint()?;
//!         Ok::<i32, TaskError>(4)
//!     })?;
//!     let parts = join_all(&cx, vec![a, b]).await?;
//!     Ok(parts.into_iter().sum::<i32>())
//! });
//!
//! assert_eq!(total.wait().await?, 7);
//! engine.shutdown().await?;
//! # Ok(()) }
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::TaskError;
use crate::tree::{CancelReason, Outcome, TaskId, TaskNode, TaskState};

use super::TaskContext;

/// Handle to a task with no interesting result value.
///
/// Cheap to clone; clones observe and control the same task.
#[derive(Clone)]
pub struct TaskHandle {
    pub(crate) node: Arc<TaskNode>,
}

impl TaskHandle {
    pub(crate) fn new(node: Arc<TaskNode>) -> Self {
        Self { node }
    }

    /// Identifier of the task.
    pub fn id(&self) -> TaskId {
        self.node.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.node.state()
    }

    /// `true` while no cancellation request has reached the task.
    pub fn is_active(&self) -> bool {
        !self.node.cancel_requested() && self.node.state().is_live()
    }

    /// Requests cancellation of the task and everything below it.
    ///
    /// Returns immediately; the subtree is already marked `Cancelling` when
    /// this returns, and bodies observe the request at their next
    /// checkpoint.
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::user());
    }

    /// Requests cancellation with a caller-supplied reason.
    pub fn cancel_with(&self, reason: CancelReason) {
        self.node
            .scope
            .engine
            .tree
            .cancel_subtree(&self.node, reason);
    }

    /// Terminal outcome, once the task has settled.
    pub fn outcome(&self) -> Option<Outcome> {
        self.node.terminal_outcome()
    }

    /// Registers a callback that runs exactly once with the terminal
    /// [`Outcome`].
    ///
    /// Runs synchronously with the terminal transition, on the task's lane.
    /// When the task has already settled, the callback runs immediately on
    /// the registering thread.
    pub fn invoke_on_completion(&self, callback: impl FnOnce(&Outcome) + Send + 'static) {
        let mut inner = self.node.inner.lock();
        if let Some(outcome) = inner.terminal_outcome() {
            drop(inner);
            callback(&outcome);
        } else {
            inner.callbacks.push(Box::new(callback));
        }
    }

    /// Waits for the task to settle, as a checkpoint of the waiting task.
    pub async fn join(&self, cx: &TaskContext) -> Result<(), TaskError> {
        cx.checkpoint()?;
        tokio::select! {
            _ = cx.node.token.cancelled() => Err(TaskError::Canceled(
                cx.node.cancel_reason_or(CancelReason::parent()),
            )),
            _ = self.node.wait_terminal() => self.settled(),
        }
    }

    /// Waits for the task to settle from outside any task.
    ///
    /// Unlike [`join`](Self::join) this never raises for the caller; only
    /// the awaited task's outcome decides the result.
    pub async fn wait(&self) -> Result<(), TaskError> {
        self.node.wait_terminal().await;
        self.settled()
    }

    fn settled(&self) -> Result<(), TaskError> {
        match self.node.terminal_outcome() {
            Some(Outcome::Completed) => Ok(()),
            Some(Outcome::Cancelled(reason)) => Err(TaskError::Canceled(reason)),
            Some(Outcome::Failed(error)) => Err(TaskError::dependency(self.node.id, error)),
            None => Err(TaskError::failed("task not settled")),
        }
    }
}

/// Handle to a task that produces a `T`.
pub struct ResultHandle<T> {
    node: Arc<TaskNode>,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for ResultHandle<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            _value: PhantomData,
        }
    }
}

impl<T: Send + 'static> ResultHandle<T> {
    pub(crate) fn new(node: Arc<TaskNode>) -> Self {
        Self {
            node,
            _value: PhantomData,
        }
    }

    /// Identifier of the task.
    pub fn id(&self) -> TaskId {
        self.node.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.node.state()
    }

    /// `true` while no cancellation request has reached the task.
    pub fn is_active(&self) -> bool {
        !self.node.cancel_requested() && self.node.state().is_live()
    }

    /// Requests cancellation of the task and everything below it.
    pub fn cancel(&self) {
        self.as_task().cancel();
    }

    /// Requests cancellation with a caller-supplied reason.
    pub fn cancel_with(&self, reason: CancelReason) {
        self.as_task().cancel_with(reason);
    }

    /// Registers a callback that runs exactly once with the terminal
    /// [`Outcome`]. See [`TaskHandle::invoke_on_completion`].
    pub fn invoke_on_completion(&self, callback: impl FnOnce(&Outcome) + Send + 'static) {
        self.as_task().invoke_on_completion(callback);
    }

    /// Untyped view of the same task.
    pub fn as_task(&self) -> TaskHandle {
        TaskHandle::new(self.node.clone())
    }

    /// Waits for the value, as a checkpoint of the waiting task.
    pub async fn join(&self, cx: &TaskContext) -> Result<T, TaskError> {
        cx.checkpoint()?;
        tokio::select! {
            _ = cx.node.token.cancelled() => Err(TaskError::Canceled(
                cx.node.cancel_reason_or(CancelReason::parent()),
            )),
            _ = self.node.wait_terminal() => self.take_value(),
        }
    }

    /// Waits for the value from outside any task.
    pub async fn wait(&self) -> Result<T, TaskError> {
        self.node.wait_terminal().await;
        self.take_value()
    }

    fn take_value(&self) -> Result<T, TaskError> {
        let mut inner = self.node.inner.lock();
        match inner.state {
            TaskState::Completed => {
                let boxed = inner
                    .value
                    .take()
                    .ok_or_else(|| TaskError::failed("result already consumed"))?;
                match boxed.downcast::<T>() {
                    Ok(value) => Ok(*value),
                    Err(_) => Err(TaskError::failed("result type mismatch")),
                }
            }
            TaskState::Cancelled => Err(TaskError::Canceled(
                inner
                    .cancel_reason
                    .clone()
                    .unwrap_or_else(CancelReason::parent),
            )),
            TaskState::Failed => Err(TaskError::dependency(
                self.node.id,
                inner
                    .error
                    .clone()
                    .unwrap_or_else(|| TaskError::failed("unrecorded failure")),
            )),
            _ => Err(TaskError::failed("task not settled")),
        }
    }
}

/// Joins every handle in order, fail-fast on the first error.
///
/// Later handles are left running when an earlier one fails; under a
/// fail-fast scope their sweep arrives through the policy instead.
pub async fn join_all<T, I>(cx: &TaskContext, handles: I) -> Result<Vec<T>, TaskError>
where
    T: Send + 'static,
    I: IntoIterator<Item = ResultHandle<T>>,
{
    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.join(cx).await?);
    }
    Ok(values)
}
