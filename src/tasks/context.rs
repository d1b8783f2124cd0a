//! # Task context: the capability handle a body runs with.
//!
//! Every task body receives a [`TaskContext`]. It is how the body observes
//! cancellation, launches children, hops lanes, and opens nested scopes.
//!
//! ## Checkpoints
//!
//! Cancellation is cooperative and never preemptive: a request only takes
//! effect when the body crosses a checkpoint. These are checkpoints:
//!
//! - [`TaskContext::checkpoint`], the explicit probe
//! - [`TaskContext::sleep`] and [`TaskContext::yield_now`], at entry and
//!   while suspended
//! - child submission ([`TaskContext::launch`], [`TaskContext::spawn`] and
//!   the `_on` variants)
//! - [`TaskContext::with_lane`] and handle `join`s, at entry and while
//!   waiting
//!
//! Each returns `Err(TaskError::Canceled)` once a request has landed, which
//! the body propagates with `?`. A body that never crosses a checkpoint runs
//! to its natural end even when cancelled; it still settles `Cancelled`.
//!
//! ## Example
//! ```
//! use std::time::Duration;
//! use taskgrove::Engine;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::builder().build()?;
//! let scope = engine.scope("work").build();
//!
//! let task = scope.launch(|cx| async move {
//!     let mut beats = 0u32;
//!     while cx.is_active() && beats < 3 {
//!         cx.sleep(Duration::from_millis(10)).await?;
//!         beats += 1;
//!     }
//!     Ok(())
//! });
//!
//! task.wait().await?;
//! engine.shutdown().await?;
//! # Ok(()) }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::core::Lane;
use crate::error::TaskError;
use crate::scopes::ScopeBuilder;
use crate::tree::{CancelReason, TaskId, TaskNode};

use super::{ResultHandle, TaskHandle};

/// In-body handle to the running task's node, scope, and engine.
///
/// Cheap to clone; clones refer to the same task.
#[derive(Clone)]
pub struct TaskContext {
    pub(crate) node: Arc<TaskNode>,
}

impl TaskContext {
    pub(crate) fn new(node: Arc<TaskNode>) -> Self {
        Self { node }
    }

    /// Identifier of the running task.
    pub fn id(&self) -> TaskId {
        self.node.id
    }

    /// Lane this task's body polls on.
    pub fn lane(&self) -> Lane {
        self.node.lane.clone()
    }

    /// Name of the owning scope.
    pub fn scope_name(&self) -> &str {
        &self.node.scope.name
    }

    /// `true` while no cancellation request has reached this task.
    pub fn is_active(&self) -> bool {
        !self.node.cancel_requested() && self.node.state().is_live()
    }

    /// Explicit cancellation probe.
    ///
    /// Returns `Err(TaskError::Canceled)` with the winning reason once a
    /// request has landed; `Ok(())` otherwise.
    pub fn checkpoint(&self) -> Result<(), TaskError> {
        match self.node.pending_cancel() {
            Some(reason) => Err(TaskError::Canceled(reason)),
            None => Ok(()),
        }
    }

    /// Sleeps for `duration`, observing cancellation while suspended.
    pub async fn sleep(&self, duration: Duration) -> Result<(), TaskError> {
        self.checkpoint()?;
        tokio::select! {
            _ = self.node.token.cancelled() => Err(TaskError::Canceled(
                self.node.cancel_reason_or(CancelReason::parent()),
            )),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Yields the lane's worker thread, rechecking cancellation on resume.
    ///
    /// On a single-threaded lane this is what lets queued tasks interleave
    /// with a long-running body.
    pub async fn yield_now(&self) -> Result<(), TaskError> {
        self.checkpoint()?;
        tokio::task::yield_now().await;
        self.checkpoint()
    }

    /// Requests cancellation of this task and its children.
    ///
    /// Strictly local: the parent and siblings are unaffected. The request
    /// takes effect at the body's next checkpoint.
    pub fn cancel_self(&self) {
        self.node.scope.engine.tree.cancel_subtree(
            &self.node,
            CancelReason::user().with_message("self-cancel"),
        );
    }

    /// Number of direct children that have not yet settled.
    pub fn child_count(&self) -> usize {
        self.node.child_count()
    }

    /// Launches a child task on this task's lane.
    ///
    /// Checkpoint: fails with `Canceled` instead of submitting when a cancel
    /// request has already landed.
    pub fn launch<F, Fut>(&self, body: F) -> Result<TaskHandle, TaskError>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.checkpoint()?;
        Ok(TaskHandle::new(self.node.scope.submit::<(), _, _>(
            Some(&self.node),
            None,
            body,
        )))
    }

    /// Launches a child task on an explicit lane.
    pub fn launch_on<F, Fut>(&self, lane: Lane, body: F) -> Result<TaskHandle, TaskError>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.checkpoint()?;
        Ok(TaskHandle::new(self.node.scope.submit::<(), _, _>(
            Some(&self.node),
            Some(lane),
            body,
        )))
    }

    /// Spawns a value-producing child on this task's lane.
    pub fn spawn<T, F, Fut>(&self, body: F) -> Result<ResultHandle<T>, TaskError>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        self.checkpoint()?;
        Ok(ResultHandle::new(self.node.scope.submit::<T, _, _>(
            Some(&self.node),
            None,
            body,
        )))
    }

    /// Spawns a value-producing child on an explicit lane.
    pub fn spawn_on<T, F, Fut>(&self, lane: Lane, body: F) -> Result<ResultHandle<T>, TaskError>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        self.checkpoint()?;
        Ok(ResultHandle::new(self.node.scope.submit::<T, _, _>(
            Some(&self.node),
            Some(lane),
            body,
        )))
    }

    /// Runs `body` as a child on `lane` and awaits its value in place.
    ///
    /// The hop is structured both ways: cancelling this task sweeps the
    /// child, and the child's failure re-raises here as a `Dependency`
    /// error.
    pub async fn with_lane<T, F, Fut>(&self, lane: Lane, body: F) -> Result<T, TaskError>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let handle = self.spawn_on(lane, body)?;
        handle.join(self).await
    }

    /// Opens a builder for a new scope that is independent of this task.
    ///
    /// The scope outlives the task; it inherits this task's lane unless the
    /// builder overrides it.
    pub fn scope(&self, name: impl Into<Arc<str>>) -> ScopeBuilder {
        ScopeBuilder::new(
            self.node.scope.engine.clone(),
            name.into(),
            self.node.lane.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use tokio::sync::oneshot;

    use crate::core::{Engine, EngineConfig};
    use crate::tree::{CancelKind, Outcome};

    fn test_engine() -> Engine {
        Engine::builder()
            .config(EngineConfig {
                grace: Duration::from_secs(5),
                cpu_workers: 2,
                io_workers: 2,
                ..EngineConfig::default()
            })
            .build()
            .expect("engine")
    }

    #[tokio::test]
    async fn test_checkpoint_observes_cancel_request() {
        let engine = test_engine();
        let scope = engine.scope("beats").build();
        let beats = Arc::new(AtomicUsize::new(0));
        let counter = beats.clone();

        let task = scope.launch(move |cx| async move {
            loop {
                cx.sleep(Duration::from_millis(10)).await?;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(35)).await;
        task.cancel();

        let err = task.wait().await.unwrap_err();
        assert!(err.is_cancellation());
        assert!(matches!(task.outcome(), Some(Outcome::Cancelled(_))));

        let seen = beats.load(Ordering::SeqCst);
        assert!(seen >= 1, "body never got going");
        assert!(seen < 20, "body kept beating after the request: {seen}");
    }

    #[tokio::test]
    async fn test_body_without_checkpoints_finishes_then_settles_cancelled() {
        let engine = test_engine();
        let scope = engine.scope("stubborn").build();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let task = scope.spawn(move |_cx| async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<u32, TaskError>(5)
        });

        tokio::time::sleep(Duration::from_millis(15)).await;
        task.cancel();

        let err = task.wait().await.unwrap_err();
        assert!(err.is_cancellation());
        assert!(finished.load(Ordering::SeqCst), "body runs to its natural end");
        // The value the body produced is discarded: cancel won.
        assert!(matches!(
            task.as_task().outcome(),
            Some(Outcome::Cancelled(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_self_stays_local() {
        let engine = test_engine();
        let scope = engine.scope("local").build();

        let quitter = scope.launch(|cx| async move {
            cx.cancel_self();
            cx.checkpoint()?;
            Ok(())
        });
        let neighbor = scope.spawn(|cx| async move {
            cx.sleep(Duration::from_millis(40)).await?;
            Ok::<u8, TaskError>(1)
        });

        let err = quitter.wait().await.unwrap_err();
        match err {
            TaskError::Canceled(reason) => {
                assert_eq!(reason.kind(), CancelKind::User);
                assert_eq!(reason.message(), Some("self-cancel"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(neighbor.wait().await.unwrap(), 1);
        assert!(!scope.is_cancelled());
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_sweeps_whole_subtree_with_first_reason() {
        let engine = test_engine();
        let scope = engine.scope("family").build();
        let (child_tx, child_rx) = oneshot::channel();
        let (grand_tx, grand_rx) = oneshot::channel();

        let parent = scope.launch(move |cx| async move {
            let child = cx.launch(move |cx| async move {
                let grandchild = cx.launch(|cx| async move {
                    loop {
                        cx.sleep(Duration::from_millis(10)).await?;
                    }
                })?;
                let _ = grand_tx.send(grandchild);
                loop {
                    cx.sleep(Duration::from_millis(10)).await?;
                }
            })?;
            let _ = child_tx.send(child);
            loop {
                cx.sleep(Duration::from_millis(10)).await?;
            }
        });

        let child = child_rx.await.unwrap();
        let grandchild = grand_rx.await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        parent.cancel_with(CancelReason::user().with_message("stop the family"));

        // The mark lands on every level before cancel returns; each task
        // still settles at its own next checkpoint.
        for handle in [&parent, &child, &grandchild] {
            assert!(!handle.is_active(), "descendant left active after cancel");
        }

        // Every level reports the original reason, not a derived one.
        for handle in [parent, child, grandchild] {
            let err = handle.wait().await.unwrap_err();
            match err {
                TaskError::Canceled(reason) => {
                    assert_eq!(reason.kind(), CancelKind::User);
                    assert_eq!(reason.message(), Some("stop the family"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_with_lane_hops_and_returns() {
        let engine = test_engine();
        let scope = engine.scope("hop").build();

        let names = scope.spawn(|cx| async move {
            let here = std::thread::current().name().unwrap_or("").to_string();
            let there = cx
                .with_lane(Lane::single("ledger"), |cx| async move {
                    cx.checkpoint()?;
                    Ok::<String, TaskError>(
                        std::thread::current().name().unwrap_or("").to_string(),
                    )
                })
                .await?;
            Ok::<(String, String), TaskError>((here, there))
        });

        let (here, there) = names.wait().await.unwrap();
        assert!(here.contains("grove-cpu"), "got {here}");
        assert!(there.contains("grove-single-ledger"), "got {there}");
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_with_lane_child_is_swept_with_parent() {
        let engine = test_engine();
        let scope = engine.scope("hop2").build();

        let parent = scope.launch(|cx| async move {
            cx.with_lane(Lane::IoBound, |cx| async move {
                while cx.is_active() {
                    cx.sleep(Duration::from_millis(10)).await?;
                }
                Ok(())
            })
            .await?;
            Ok(())
        });

        tokio::time::sleep(Duration::from_millis(25)).await;
        parent.cancel();

        let err = tokio::time::timeout(Duration::from_secs(2), parent.wait())
            .await
            .expect("parent settles promptly once the child is swept")
            .unwrap_err();
        assert!(err.is_cancellation());
        engine.shutdown().await.unwrap();
    }
}
