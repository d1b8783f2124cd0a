//! # Engine: lanes, scope registry, event publishing, graceful shutdown.
//!
//! The [`Engine`] owns everything with a lifetime: the lane runtimes, the
//! task arena, the event bus, and the subscriber fan-out. Scopes and task
//! handles are views into it.
//!
//! ## Shutdown path
//! ```text
//! engine.shutdown()                     (or run_until_signal() on a signal)
//!     │
//!     ├─ close()                        refuse new scopes and submissions
//!     ├─ publish(ShutdownRequested)
//!     ├─ teardown every live scope      sweeps every task tree
//!     │
//!     ├─ wait for the arena to drain, up to config.grace
//!     │     ├─ drained     → publish(AllStoppedWithin),  Ok(())
//!     │     └─ still busy  → publish(GraceExceeded),     Err(GraceExceeded)
//!     │
//!     ├─ drain subscriber queues
//!     └─ tear down the lane runtimes
//! ```
//!
//! ## Rules
//! - `shutdown` is idempotent: the first caller drives the drain, later and
//!   concurrent callers return `Ok(())` immediately.
//! - Call `shutdown` from outside the engine's own lanes (a `#[tokio::main]`
//!   context works). A task waiting on its own engine's drain can never
//!   settle, so the grace window would always lapse.
//! - After shutdown, scopes and handles stay usable: submissions settle
//!   `Cancelled` on arrival and queries keep answering.
//!
//! ## Example
//! ```
//! use taskgrove::{Engine, TaskError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::builder().build()?;
//! let scope = engine.scope("work").build();
//!
//! let sum = scope.spawn(|cx| async move {
//!     cx.checkpoint()?;
//!     Ok::<_, TaskError>(2 + 2)
//! });
//! assert_eq!(sum.wait().await?, 4);
//!
//! engine.shutdown().await?;
//! # Ok(()) }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::scopes::{ScopeBuilder, ScopeShared};
use crate::subscribers::SubscriberSet;
use crate::tree::{CancelReason, TaskTree};

use super::{shutdown, EngineBuilder, EngineConfig, LaneSet};

/// Publish side of the event plumbing: every event goes to the broadcast
/// bus (for [`Engine::subscribe`] receivers) and, synchronously, into the
/// subscriber queues.
///
/// Emitting inline rather than through a forwarding task means that once
/// `publish` returns, the event is either queued for every subscriber or
/// already reported as dropped; the shutdown drain can rely on that.
#[derive(Clone)]
pub(crate) struct EventSink {
    bus: Bus,
    set: Option<Arc<SubscriberSet>>,
}

impl EventSink {
    pub(crate) fn new(bus: Bus, set: Option<Arc<SubscriberSet>>) -> Self {
        Self { bus, set }
    }

    pub(crate) fn publish(&self, event: Event) {
        if let Some(set) = &self.set {
            set.emit(&Arc::new(event.clone()));
        }
        self.bus.publish(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }
}

/// State shared by the engine handle, its scopes, and every task node.
pub(crate) struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) lanes: LaneSet,
    pub(crate) tree: TaskTree,
    pub(crate) sink: EventSink,
    scopes: Mutex<Vec<Weak<ScopeShared>>>,
    subscribers: Option<Arc<SubscriberSet>>,
    closed: AtomicBool,
}

impl EngineShared {
    pub(crate) fn new(
        config: EngineConfig,
        lanes: LaneSet,
        tree: TaskTree,
        sink: EventSink,
        subscribers: Option<Arc<SubscriberSet>>,
    ) -> Self {
        Self {
            config,
            lanes,
            tree,
            sink,
            scopes: Mutex::new(Vec::new()),
            subscribers,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Flips the closed latch; returns the previous value.
    fn close(&self) -> bool {
        self.closed.swap(true, Ordering::SeqCst)
    }

    /// Tracks the scope for shutdown. A scope registered after the engine
    /// closed is torn down on the spot.
    pub(crate) fn register_scope(&self, scope: &Arc<ScopeShared>) {
        {
            let mut scopes = self.scopes.lock();
            scopes.retain(|w| w.strong_count() > 0);
            scopes.push(Arc::downgrade(scope));
        }
        if self.is_closed() {
            scope.teardown(CancelReason::shutdown());
        }
    }

    fn live_scopes(&self) -> Vec<Arc<ScopeShared>> {
        let mut scopes = self.scopes.lock();
        scopes.retain(|w| w.strong_count() > 0);
        scopes.iter().filter_map(Weak::upgrade).collect()
    }
}

/// Handle to the task engine. Cloning shares the same engine.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<EngineShared>,
}

impl Engine {
    /// Starts building an engine with default configuration.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub(crate) fn from_shared(shared: Arc<EngineShared>) -> Self {
        Self { shared }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Starts building a scope owned by this engine.
    ///
    /// The scope's default lane is the engine's `default_lane` unless
    /// [`lane`](crate::ScopeBuilder::lane) picks another.
    pub fn scope(&self, name: impl Into<Arc<str>>) -> ScopeBuilder {
        ScopeBuilder::new(
            self.shared.clone(),
            name.into(),
            self.shared.config.default_lane.clone(),
        )
    }

    /// Opens a broadcast receiver over all engine events.
    ///
    /// Receivers that lag more than `bus_capacity` events behind skip the
    /// overwritten ones.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.sink.subscribe()
    }

    /// Number of tasks that have not yet settled, across all scopes.
    pub fn live_tasks(&self) -> usize {
        self.shared.tree.live_count()
    }

    /// `true` once shutdown has started.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Stops the engine: sweeps every scope, waits up to `config.grace` for
    /// the task arena to drain, then tears down the lane runtimes.
    ///
    /// Returns [`RuntimeError::GraceExceeded`] with a description of every
    /// stuck task when the grace window lapses; the lanes are torn down
    /// either way.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        if self.shared.close() {
            return Ok(());
        }
        self.shared
            .sink
            .publish(Event::new(EventKind::ShutdownRequested));
        for scope in self.shared.live_scopes() {
            scope.teardown(CancelReason::shutdown());
        }

        let grace = self.shared.config.grace;
        let drained = tokio::time::timeout(grace, self.shared.tree.wait_quiescent()).await;
        let result = match drained {
            Ok(()) => {
                self.shared
                    .sink
                    .publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                let stuck = self.shared.tree.snapshot();
                self.shared.sink.publish(
                    Event::new(EventKind::GraceExceeded).with_reason(stuck.join(", ")),
                );
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        };

        if let Some(set) = &self.shared.subscribers {
            set.shutdown().await;
        }
        self.shared.lanes.teardown();
        result
    }

    /// Blocks until a termination signal arrives, then runs [`Engine::shutdown`].
    ///
    /// Listens for `SIGINT`, `SIGTERM`, and `SIGQUIT` on Unix, `Ctrl-C`
    /// elsewhere.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        let _ = shutdown::wait_for_shutdown_signal().await;
        self.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::core::Lane;
    use crate::error::TaskError;
    use crate::subscribers::Subscribe;
    use crate::tree::{CancelKind, Outcome};

    fn small_engine(grace: Duration) -> Engine {
        Engine::builder()
            .config(EngineConfig {
                grace,
                cpu_workers: 2,
                io_workers: 2,
                ..EngineConfig::default()
            })
            .build()
            .expect("engine")
    }

    fn drained_kinds(rx: &mut broadcast::Receiver<Event>) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        kinds
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_reports() {
        let engine = small_engine(Duration::from_secs(5));
        let scope = engine.scope("workers").build();
        let mut rx = engine.subscribe();

        let looper = scope.launch(|cx| async move {
            loop {
                cx.sleep(Duration::from_millis(10)).await?;
            }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        engine.shutdown().await.unwrap();

        assert!(engine.is_closed());
        assert_eq!(engine.live_tasks(), 0);
        match looper.outcome() {
            Some(Outcome::Cancelled(reason)) => {
                assert_eq!(reason.kind(), CancelKind::Shutdown);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let kinds = drained_kinds(&mut rx);
        assert!(kinds.contains(&EventKind::ShutdownRequested));
        assert!(kinds.contains(&EventKind::ScopeCancelled));
        assert!(kinds.contains(&EventKind::TaskCancelled));
        assert!(kinds.contains(&EventKind::AllStoppedWithin));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let engine = small_engine(Duration::from_secs(5));
        engine.shutdown().await.unwrap();
        engine.shutdown().await.unwrap();
        engine.clone().shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_grace_exceeded_reports_stuck_tasks() {
        let engine = small_engine(Duration::from_millis(200));
        let scope = engine.scope("stubborn").build();

        // No checkpoints anywhere: this body never observes the sweep.
        let _stuck = scope.launch(|_cx| async move {
            loop {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        let err = engine.shutdown().await.unwrap_err();
        match err {
            RuntimeError::GraceExceeded { stuck, .. } => {
                assert_eq!(stuck.len(), 1, "got {stuck:?}");
                assert!(stuck[0].contains("stubborn"), "got {stuck:?}");
                assert!(stuck[0].contains("cancelling"), "got {stuck:?}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_submissions_after_shutdown_settle_cancelled() {
        let engine = small_engine(Duration::from_secs(5));
        let scope = engine.scope("early").build();
        engine.shutdown().await.unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let late = scope.launch(move |_cx| async move {
            flag.store(true, AtomicOrdering::SeqCst);
            Ok(())
        });

        match late.outcome() {
            Some(Outcome::Cancelled(reason)) => {
                assert_eq!(reason.kind(), CancelKind::Shutdown);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!ran.load(AtomicOrdering::SeqCst), "body must never run");

        let born_dead = engine.scope("late").build();
        assert!(born_dead.is_cancelled());
    }

    #[tokio::test]
    async fn test_live_tasks_counts_unsettled() {
        let engine = small_engine(Duration::from_secs(5));
        let scope = engine.scope("count").build();

        let a = scope.spawn(|cx| async move {
            cx.sleep(Duration::from_millis(60)).await?;
            Ok::<u32, TaskError>(1)
        });
        let b = scope.spawn(|cx| async move {
            cx.sleep(Duration::from_millis(60)).await?;
            Ok::<u32, TaskError>(2)
        });
        assert_eq!(engine.live_tasks(), 2);

        assert_eq!(a.wait().await.unwrap(), 1);
        assert_eq!(b.wait().await.unwrap(), 2);
        assert_eq!(engine.live_tasks(), 0);
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_events_identify_scope_task_lane() {
        let engine = small_engine(Duration::from_secs(5));
        let scope = engine.scope("tagged").lane(Lane::single("db")).build();
        let mut rx = engine.subscribe();

        let task = scope.spawn(|cx| async move {
            cx.checkpoint()?;
            Ok::<u8, TaskError>(1)
        });
        task.wait().await.unwrap();

        let mut completed = None;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::TaskCompleted {
                completed = Some(ev);
            }
        }
        let ev = completed.expect("completed event");
        assert_eq!(ev.scope.as_deref(), Some("tagged"));
        assert_eq!(ev.task, Some(task.id()));
        assert_eq!(ev.lane.as_deref(), Some("single:db"));
        engine.shutdown().await.unwrap();
    }

    struct Recording {
        kinds: Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl Subscribe for Recording {
        async fn on_event(&self, event: &Event) {
            self.kinds.lock().push(event.kind);
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_registered_subscriber_drains_before_shutdown_returns() {
        let recording = Arc::new(Recording {
            kinds: Mutex::new(Vec::new()),
        });
        let engine = Engine::builder()
            .config(EngineConfig {
                grace: Duration::from_secs(5),
                cpu_workers: 1,
                io_workers: 2,
                ..EngineConfig::default()
            })
            .with_subscribers(vec![recording.clone()])
            .build()
            .expect("engine");

        let scope = engine.scope("observed").build();
        let task = scope.spawn(|cx| async move {
            cx.checkpoint()?;
            Ok::<u8, TaskError>(9)
        });
        assert_eq!(task.wait().await.unwrap(), 9);
        engine.shutdown().await.unwrap();

        let kinds = recording.kinds.lock().clone();
        assert!(kinds.contains(&EventKind::ScopeOpened), "got {kinds:?}");
        assert!(kinds.contains(&EventKind::TaskLaunched), "got {kinds:?}");
        assert!(kinds.contains(&EventKind::TaskCompleted), "got {kinds:?}");
        assert!(kinds.contains(&EventKind::ShutdownRequested), "got {kinds:?}");
        assert!(kinds.contains(&EventKind::AllStoppedWithin), "got {kinds:?}");
    }
}
