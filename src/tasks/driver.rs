//! # Task driver: the future a lane actually polls.
//!
//! Wraps a task body and walks it through the lifecycle: run the body, catch
//! panics, sweep or wait for children, settle the record, and report failures
//! to the scope policy.
//!
//! ```text
//! body ──catch_unwind──► Ok(value) ───► Completing ──children settled──► Completed
//!                        │                  └─ cancel request wins ────► Cancelled
//!                        Err(Canceled) ► sweep own subtree ─ children ─► Cancelled
//!                        Err(other) ──► Failing ─ sweep children ──────► Failed ─► report
//!                        panic ───────────┘
//! ```
//!
//! ## Rules
//! - The body is never raced against its token. Cancellation is observed at
//!   checkpoints inside the body, or at the completing-wait after it returns.
//! - A task settles only after every child has settled; the driver never
//!   abandons children.
//! - Settling happens on the task's own lane, so completion callbacks run
//!   there too.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::error::TaskError;
use crate::tree::{CancelReason, TaskNode, Terminal};

/// Drives one task body to a terminal state. Spawned onto the task's lane.
pub(crate) async fn drive<F>(node: Arc<TaskNode>, body: F)
where
    F: Future<Output = Result<Box<dyn Any + Send>, TaskError>> + Send,
{
    let tree = &node.scope.engine.tree;

    match AssertUnwindSafe(body).catch_unwind().await {
        Ok(Ok(value)) => {
            if !tree.mark_completing(&node) {
                // A cancel request won the race before the body finished;
                // the value is discarded.
                let reason = node.cancel_reason_or(CancelReason::parent());
                settle_cancelled(&node, reason).await;
                return;
            }
            let interrupted = tokio::select! {
                _ = node.token.cancelled() => true,
                _ = node.wait_children_settled() => false,
            };
            if interrupted || node.cancel_requested() {
                let reason = node.cancel_reason_or(CancelReason::parent());
                settle_cancelled(&node, reason).await;
            } else {
                tree.finalize(&node, Terminal::Completed(value));
            }
        }
        Ok(Err(TaskError::Canceled(reason))) => {
            settle_cancelled(&node, reason).await;
        }
        Ok(Err(error)) => {
            settle_failed(&node, error).await;
        }
        Err(payload) => {
            settle_failed(&node, TaskError::panicked(panic_message(payload))).await;
        }
    }
}

/// Sweeps the task's own subtree, waits for it, settles `Cancelled`.
///
/// The sweep is idempotent; when an ancestor already marked the subtree, the
/// recorded reason wins over `reason`.
async fn settle_cancelled(node: &Arc<TaskNode>, reason: CancelReason) {
    let tree = &node.scope.engine.tree;
    tree.cancel_subtree(node, reason);
    node.wait_children_settled().await;
    let reason = node.cancel_reason_or(CancelReason::parent());
    tree.finalize(node, Terminal::Cancelled(reason));
}

/// Sweeps the children, waits for them, settles `Failed`, and hands the
/// failure to the scope policy.
async fn settle_failed(node: &Arc<TaskNode>, error: TaskError) {
    let scope = node.scope.clone();
    let tree = &scope.engine.tree;
    tree.mark_failing(node);
    tree.cancel_children(node, CancelReason::parent());
    node.wait_children_settled().await;
    tree.finalize(node, Terminal::Failed(error.clone()));
    scope.report_failure(node.id, &error);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
