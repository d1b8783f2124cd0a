//! # Scopes: ownership domains for task trees.
//!
//! A [`Scope`] owns every task submitted through it, directly or through
//! those tasks' contexts. Cancelling the scope sweeps every tree under it;
//! its [`Policy`] decides how far one task's failure reaches.
//!
//! ## Architecture
//! ```text
//! Engine
//!   └── Scope "ingest" (policy, default lane, root token)
//!         ├── task #1 ── child #4, child #5
//!         ├── task #2
//!         └── task #3 ── child #6
//!
//! scope.cancel():  mark all six Cancelling, then fire the root tokens
//! task #2 fails :  FailFast   → sweep #1..#6, handler once
//!                  Supervisor → #2 settles Failed, others keep running
//! ```
//!
//! ## Rules
//! - Submissions on a cancelled scope (or a closed engine) settle `Cancelled`
//!   without their body ever running.
//! - A scope keeps accepting work after task failures under
//!   [`Policy::Supervisor`]; under [`Policy::FailFast`] the first failure
//!   tears it down for good.
//! - Scope names are labels for events and logs; they are not required to be
//!   unique.
//!
//! ## Example
//! ```
//! use taskgrove::{Engine, Policy, TaskError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::builder().build()?;
//! let scope = engine.scope("ingest").policy(Policy::Supervisor).build();
//!
//! let parse = scope.spawn(|cx| async move {
//!     cx.checkpoint()?;
//!     Ok::<u32, TaskError>(42)
//! });
//! assert_eq!(parse.wait().await?, 42);
//!
//! engine.shutdown().await?;
//! # Ok(()) }
//! ```

use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::{EngineShared, Lane};
use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::tasks::{drive, ResultHandle, TaskContext, TaskHandle};
use crate::tree::{CancelReason, TaskId, TaskNode, Terminal};

use super::Policy;

/// Callback invoked when a failure is reported to a scope.
pub(crate) type FailureHandler = Arc<dyn Fn(TaskId, &TaskError) + Send + Sync + 'static>;

/// State shared by a scope's handles, its task nodes, and the engine.
pub(crate) struct ScopeShared {
    pub(crate) name: Arc<str>,
    pub(crate) policy: Policy,
    pub(crate) default_lane: Lane,
    /// Root of the scope's token hierarchy; every root task's token is a
    /// child of it.
    pub(crate) token: CancellationToken,
    pub(crate) engine: Arc<EngineShared>,
    roots: Mutex<HashSet<TaskId>>,
    handler: Mutex<Option<FailureHandler>>,
    /// Reason recorded at teardown, used for submissions that arrive after.
    swept_reason: Mutex<Option<CancelReason>>,
    cancelled: AtomicBool,
    /// Fail-fast latch: set by the first reported failure, never cleared.
    tripped: AtomicBool,
}

impl ScopeShared {
    fn new(
        name: Arc<str>,
        policy: Policy,
        default_lane: Lane,
        engine: Arc<EngineShared>,
        handler: Option<FailureHandler>,
    ) -> Self {
        Self {
            name,
            policy,
            default_lane,
            token: CancellationToken::new(),
            engine,
            roots: Mutex::new(HashSet::new()),
            handler: Mutex::new(handler),
            swept_reason: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            tripped: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn root_count(&self) -> usize {
        self.roots.lock().len()
    }

    pub(crate) fn detach_root(&self, id: TaskId) {
        self.roots.lock().remove(&id);
    }

    pub(crate) fn set_handler(&self, handler: FailureHandler) {
        *self.handler.lock() = Some(handler);
    }

    /// Registers, links, and dispatches one task.
    ///
    /// This is the single submission path: `Scope::launch/spawn` come here
    /// with no parent, `TaskContext::launch/spawn` with one. The node is
    /// always registered and an event always published, even when the
    /// submission is dead on arrival; observers then see a launch followed
    /// immediately by a terminal event.
    pub(crate) fn submit<T, F, Fut>(
        self: &Arc<Self>,
        parent: Option<&Arc<TaskNode>>,
        lane_override: Option<Lane>,
        body: F,
    ) -> Arc<TaskNode>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let engine = &self.engine;
        let id = engine.tree.allocate_id();
        let lane = lane_override
            .or_else(|| parent.map(|p| p.lane.clone()))
            .unwrap_or_else(|| self.default_lane.clone());
        let token = match parent {
            Some(p) => p.token.child_token(),
            None => self.token.child_token(),
        };
        let node = Arc::new(TaskNode::new(
            id,
            self.clone(),
            parent.map(|p| p.id),
            lane.clone(),
            token,
        ));
        engine.tree.register(node.clone());
        match parent {
            Some(p) => p.inner.lock().children.push(id),
            None => {
                self.roots.lock().insert(id);
            }
        }
        engine.sink.publish(
            Event::new(EventKind::TaskLaunched)
                .with_scope(self.name.clone())
                .with_task(id)
                .with_lane(lane.as_label()),
        );

        // Dead on arrival: the scope was torn down, the engine closed, or the
        // parent's token cascade already reached the fresh child token.
        if engine.is_closed() || self.is_cancelled() || node.token.is_cancelled() {
            let reason = if engine.is_closed() {
                CancelReason::shutdown()
            } else if self.is_cancelled() {
                self.swept_reason
                    .lock()
                    .clone()
                    .unwrap_or_else(CancelReason::scope)
            } else {
                CancelReason::parent()
            };
            engine.tree.cancel_subtree(&node, reason.clone());
            engine.tree.finalize(&node, Terminal::Cancelled(reason));
            return node;
        }

        let cx = TaskContext::new(node.clone());
        let fut = body(cx);
        let driver = drive(node.clone(), async move {
            fut.await.map(|v| Box::new(v) as Box<dyn Any + Send>)
        });
        if let Err(err) = engine.lanes.dispatch(&lane, Box::pin(driver)) {
            let error = TaskError::failed(err.as_message());
            engine.tree.finalize(&node, Terminal::Failed(error.clone()));
            self.report_failure(id, &error);
        }
        node
    }

    /// Cancels every root tree and refuses all future submissions.
    ///
    /// Idempotent; only the first call sweeps and publishes.
    pub(crate) fn teardown(&self, reason: CancelReason) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.swept_reason.lock() = Some(reason.clone());
        let roots: Vec<TaskId> = self.roots.lock().iter().copied().collect();
        for id in roots {
            if let Some(node) = self.engine.tree.get(id) {
                self.engine.tree.cancel_subtree(&node, reason.clone());
            }
        }
        self.token.cancel();
        self.engine.sink.publish(
            Event::new(EventKind::ScopeCancelled)
                .with_scope(self.name.clone())
                .with_reason(reason.to_string()),
        );
    }

    /// Routes one task's terminal failure through the scope policy.
    pub(crate) fn report_failure(&self, task: TaskId, error: &TaskError) {
        match self.policy {
            Policy::FailFast => {
                if self.tripped.swap(true, Ordering::SeqCst) {
                    self.engine.sink.publish(
                        Event::new(EventKind::FailureSuppressed)
                            .with_scope(self.name.clone())
                            .with_task(task)
                            .with_reason(error.as_message()),
                    );
                    return;
                }
                self.teardown(CancelReason::sibling_failed());
                let handler = self.handler.lock().clone();
                if let Some(handler) = handler {
                    handler(task, error);
                }
            }
            Policy::Supervisor => {
                let handler = self.handler.lock().clone();
                if let Some(handler) = handler {
                    handler(task, error);
                }
            }
        }
    }
}

/// Builder for a [`Scope`], obtained from [`Engine::scope`](crate::Engine::scope)
/// or [`TaskContext::scope`](crate::TaskContext::scope).
pub struct ScopeBuilder {
    engine: Arc<EngineShared>,
    name: Arc<str>,
    policy: Option<Policy>,
    lane: Option<Lane>,
    /// Lane inherited from the creating context (or the engine default) when
    /// none is set explicitly.
    inherited_lane: Lane,
    handler: Option<FailureHandler>,
}

impl ScopeBuilder {
    pub(crate) fn new(engine: Arc<EngineShared>, name: Arc<str>, inherited_lane: Lane) -> Self {
        Self {
            engine,
            name,
            policy: None,
            lane: None,
            inherited_lane,
            handler: None,
        }
    }

    /// Sets the failure policy. Defaults to the engine's `default_policy`.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Sets the default lane for tasks submitted through the scope.
    ///
    /// When unset, the scope inherits the creating context's lane (or the
    /// engine's `default_lane`).
    pub fn lane(mut self, lane: Lane) -> Self {
        self.lane = Some(lane);
        self
    }

    /// Registers the failure handler the policy reports to.
    pub fn on_failure(mut self, handler: impl Fn(TaskId, &TaskError) + Send + Sync + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Builds the scope and registers it with the engine.
    ///
    /// On a closed engine the scope is born cancelled: it exists, but every
    /// submission settles `Cancelled` immediately.
    pub fn build(self) -> Scope {
        let policy = self.policy.unwrap_or(self.engine.config.default_policy);
        let lane = self.lane.unwrap_or(self.inherited_lane);
        let engine = self.engine.clone();
        let shared = Arc::new(ScopeShared::new(
            self.name,
            policy,
            lane,
            self.engine,
            self.handler,
        ));
        engine
            .sink
            .publish(Event::new(EventKind::ScopeOpened).with_scope(shared.name.clone()));
        engine.register_scope(&shared);
        Scope { shared }
    }
}

/// Handle to a scope. Cloning shares the same underlying scope.
#[derive(Clone)]
pub struct Scope {
    pub(crate) shared: Arc<ScopeShared>,
}

impl Scope {
    /// Scope name, as used in events.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The scope's failure policy.
    pub fn policy(&self) -> Policy {
        self.shared.policy
    }

    /// Lane used for submissions that do not name one.
    pub fn default_lane(&self) -> Lane {
        self.shared.default_lane.clone()
    }

    /// Submits a root task with no result value.
    ///
    /// Never fails: if the scope is already cancelled, the returned handle
    /// refers to a task that settled `Cancelled` without running.
    pub fn launch<F, Fut>(&self, body: F) -> TaskHandle
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        TaskHandle::new(self.shared.submit::<(), _, _>(None, None, body))
    }

    /// Submits a root task on an explicit lane.
    pub fn launch_on<F, Fut>(&self, lane: Lane, body: F) -> TaskHandle
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        TaskHandle::new(self.shared.submit::<(), _, _>(None, Some(lane), body))
    }

    /// Submits a root task that produces a value.
    pub fn spawn<T, F, Fut>(&self, body: F) -> ResultHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        ResultHandle::new(self.shared.submit::<T, _, _>(None, None, body))
    }

    /// Submits a value-producing root task on an explicit lane.
    pub fn spawn_on<T, F, Fut>(&self, lane: Lane, body: F) -> ResultHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        ResultHandle::new(self.shared.submit::<T, _, _>(None, Some(lane), body))
    }

    /// Cancels the scope: every task tree under it is swept and future
    /// submissions settle `Cancelled` on arrival.
    pub fn cancel(&self) {
        self.shared.teardown(CancelReason::scope());
    }

    /// Cancels the scope with a caller-supplied reason.
    pub fn cancel_with(&self, reason: CancelReason) {
        self.shared.teardown(reason);
    }

    /// `true` once the scope has been cancelled (explicitly, by a fail-fast
    /// trip, or by engine shutdown).
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Replaces the failure handler.
    ///
    /// Failures reported before a handler exists are only published as
    /// events; they are not queued for later delivery.
    pub fn on_failure(&self, handler: impl Fn(TaskId, &TaskError) + Send + Sync + 'static) {
        self.shared.set_handler(Arc::new(handler));
    }

    /// Number of root tasks that have not yet settled.
    pub fn live_roots(&self) -> usize {
        self.shared.root_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

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
    async fn test_fail_fast_sweeps_siblings_and_reports_once() {
        let engine = test_engine();
        let reports = Arc::new(Mutex::new(Vec::new()));
        let seen = reports.clone();
        let scope = engine
            .scope("pipeline")
            .policy(Policy::FailFast)
            .on_failure(move |task, error| {
                seen.lock().push((task, error.as_label()));
            })
            .build();

        let sibling = scope.launch(|cx| async move {
            loop {
                cx.sleep(Duration::from_millis(10)).await?;
            }
        });
        let failing = scope.spawn(|cx| async move {
            cx.sleep(Duration::from_millis(30)).await?;
            Err::<(), _>(TaskError::failed("disk full"))
        });

        let err = sibling.wait().await.unwrap_err();
        match &err {
            TaskError::Canceled(reason) => assert_eq!(reason.kind(), CancelKind::SiblingFailed),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!failing.wait().await.unwrap_err().is_cancellation());
        assert!(scope.is_cancelled());

        // The handler runs right after the failing task settles; give it its
        // slice of the lane, then require exactly one report.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while reports.lock().is_empty() {
            assert!(tokio::time::Instant::now() < deadline, "handler never ran");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let recorded = reports.lock().clone();
        assert_eq!(recorded, vec![(failing.id(), "task_failed")]);
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_fast_suppresses_later_failures() {
        let engine = test_engine();
        let hits = Arc::new(AtomicUsize::new(0));
        let count = hits.clone();
        let mut rx = engine.subscribe();
        let scope = engine
            .scope("batch")
            .policy(Policy::FailFast)
            .on_failure(move |_task, _error| {
                count.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        let first = scope.launch(|_cx| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(TaskError::failed("first"))
        });
        // Ignores the sweep entirely, so it reaches its own Err after the
        // scope has already tripped.
        let second = scope.launch(|_cx| async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            Err(TaskError::failed("second"))
        });

        assert!(first.wait().await.is_err());
        assert!(second.wait().await.is_err());

        let saw_suppressed = async {
            loop {
                match rx.recv().await {
                    Ok(ev) if ev.kind == EventKind::FailureSuppressed => break,
                    Ok(_) => continue,
                    Err(_) => panic!("bus closed without a suppression event"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(2), saw_suppressed)
            .await
            .expect("second failure must be suppressed, not reported");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_supervisor_contains_failures() {
        let engine = test_engine();
        let hits = Arc::new(AtomicUsize::new(0));
        let count = hits.clone();
        let scope = engine
            .scope("jobs")
            .policy(Policy::Supervisor)
            .on_failure(move |_task, _error| {
                count.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        let failing = scope.launch(|cx| async move {
            cx.checkpoint()?;
            Err(TaskError::failed("boom"))
        });
        let healthy = scope.spawn(|cx| async move {
            cx.sleep(Duration::from_millis(60)).await?;
            Ok::<u32, TaskError>(7)
        });

        assert!(failing.wait().await.is_err());
        assert_eq!(healthy.wait().await.unwrap(), 7);
        assert!(!scope.is_cancelled());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while hits.load(Ordering::SeqCst) == 0 {
            assert!(tokio::time::Instant::now() < deadline, "handler never ran");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let late = scope.spawn(|cx| async move {
            cx.checkpoint()?;
            Ok::<u32, TaskError>(8)
        });
        assert_eq!(late.wait().await.unwrap(), 8);
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_scope_cancel_sweeps_roots_and_future_submissions() {
        let engine = test_engine();
        let scope = engine.scope("sweep").build();

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                scope.launch(|cx| async move {
                    loop {
                        cx.sleep(Duration::from_millis(10)).await?;
                    }
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(25)).await;
        scope.cancel_with(CancelReason::scope().with_message("maintenance window"));

        for task in &tasks {
            let err = task.wait().await.unwrap_err();
            match err {
                TaskError::Canceled(reason) => {
                    assert_eq!(reason.kind(), CancelKind::Scope);
                    assert_eq!(reason.message(), Some("maintenance window"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }
        assert!(scope.is_cancelled());
        assert_eq!(scope.live_roots(), 0);

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let late = scope.launch(move |_cx| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        assert!(matches!(late.outcome(), Some(Outcome::Cancelled(_))));
        assert!(!ran.load(Ordering::SeqCst));
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_nested_scope_outlives_creating_task() {
        let engine = test_engine();
        let outer = engine.scope("outer").lane(Lane::single("db")).build();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let parent = outer.launch(move |cx| async move {
            let inner = cx.scope("inner").build();
            let slow = inner.spawn(|cx| async move {
                cx.sleep(Duration::from_millis(80)).await?;
                Ok::<&'static str, TaskError>("done late")
            });
            let _ = tx.send((inner.default_lane(), slow));
            Ok(())
        });

        parent.wait().await.unwrap();
        let (inherited, slow) = rx.await.unwrap();
        assert_eq!(&*inherited.as_label(), "single:db");
        assert_eq!(slow.wait().await.unwrap(), "done late");
        engine.shutdown().await.unwrap();
    }
}
