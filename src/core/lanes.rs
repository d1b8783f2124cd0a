//! # Execution lanes: the named runtimes task bodies poll on.
//!
//! Every task is dispatched onto exactly one [`Lane`]. The engine owns one
//! dedicated tokio runtime per built-in lane, plus one per named single lane,
//! created on first use:
//!
//! ```text
//! lane          workers             ordering
//! ─────────────────────────────────────────────────────────────
//! main          1                   sequential, dispatch order
//! cpu           cpu_workers         parallel
//! io            io_workers          parallel
//! single:NAME   1 (lazy, per name)  sequential, dispatch order
//! unconfined    submitter + io      first poll inline
//! ```
//!
//! ## Rules
//! - A task's body always polls on its lane; child tasks inherit the parent's
//!   lane unless the submission names another one.
//! - `main` and `single:*` run exactly one worker thread, so two tasks on the
//!   same lane never overlap and run in dispatch order.
//! - `unconfined` polls the body once on the submitting thread (with the io
//!   runtime's context entered, so timers bind correctly), then hands the
//!   rest to the io pool at the first suspend point.
//! - Lane teardown uses `shutdown_background`; it never blocks and is safe
//!   from async context.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::{Builder as RuntimeBuilder, Handle, Runtime};

use crate::error::RuntimeError;

use super::EngineConfig;

/// Boxed driver future, the only thing lanes accept.
pub(crate) type LaneFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Where a task's body runs.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lane {
    /// The single-threaded ordered lane, for state that must never see
    /// concurrent mutation.
    Main,
    /// Worker pool sized for computation.
    CpuBound,
    /// Wider worker pool for tasks that mostly wait.
    IoBound,
    /// Named single-threaded lane, created lazily on first dispatch.
    Single(Arc<str>),
    /// Starts on the submitting thread, continues on the io pool after the
    /// first suspend point.
    Unconfined,
}

impl Lane {
    /// Builds a named single-threaded lane.
    #[inline]
    pub fn single(name: impl Into<Arc<str>>) -> Self {
        Lane::Single(name.into())
    }

    /// Label used in logs and events.
    pub fn as_label(&self) -> Arc<str> {
        match self {
            Lane::Main => Arc::from("main"),
            Lane::CpuBound => Arc::from("cpu"),
            Lane::IoBound => Arc::from("io"),
            Lane::Single(name) => Arc::from(format!("single:{name}")),
            Lane::Unconfined => Arc::from("unconfined"),
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_label())
    }
}

/// The engine's runtimes, one per lane, plus lazily created single lanes.
pub(crate) struct LaneSet {
    main: Handle,
    cpu: Handle,
    io: Handle,
    single: Mutex<HashMap<Arc<str>, Handle>>,
    runtimes: Mutex<Vec<Runtime>>,
}

impl LaneSet {
    pub(crate) fn build(config: &EngineConfig) -> Result<Self, RuntimeError> {
        let mut runtimes = Vec::with_capacity(3);
        let main = Self::add_runtime("main", 1, &mut runtimes)?;
        let cpu = Self::add_runtime("cpu", config.cpu_workers_resolved(), &mut runtimes)?;
        let io = Self::add_runtime("io", config.io_workers_resolved(), &mut runtimes)?;
        Ok(Self {
            main,
            cpu,
            io,
            single: Mutex::new(HashMap::new()),
            runtimes: Mutex::new(runtimes),
        })
    }

    fn add_runtime(
        label: &str,
        workers: usize,
        runtimes: &mut Vec<Runtime>,
    ) -> Result<Handle, RuntimeError> {
        let rt = build_runtime(label, workers)?;
        let handle = rt.handle().clone();
        runtimes.push(rt);
        Ok(handle)
    }

    /// Handle for the lane, creating named single lanes on first use.
    fn handle(&self, lane: &Lane) -> Result<Handle, RuntimeError> {
        match lane {
            Lane::Main => Ok(self.main.clone()),
            Lane::CpuBound => Ok(self.cpu.clone()),
            Lane::IoBound | Lane::Unconfined => Ok(self.io.clone()),
            Lane::Single(name) => {
                let mut single = self.single.lock();
                if let Some(handle) = single.get(name) {
                    return Ok(handle.clone());
                }
                let rt = build_runtime(&format!("single-{name}"), 1)?;
                let handle = rt.handle().clone();
                self.runtimes.lock().push(rt);
                single.insert(name.clone(), handle.clone());
                Ok(handle)
            }
        }
    }

    /// Sends a driver future to its lane.
    pub(crate) fn dispatch(&self, lane: &Lane, fut: LaneFuture) -> Result<(), RuntimeError> {
        let handle = self.handle(lane)?;
        match lane {
            Lane::Unconfined => {
                let _guard = handle.enter();
                let mut fut = fut;
                if fut.as_mut().now_or_never().is_none() {
                    handle.spawn(fut);
                }
            }
            _ => {
                handle.spawn(fut);
            }
        }
        Ok(())
    }

    /// Handle of the io pool, used for engine-internal listeners and
    /// subscriber workers.
    pub(crate) fn io_handle(&self) -> &Handle {
        &self.io
    }

    /// Abandons all lane runtimes without blocking; worker threads stop at
    /// their next yield.
    pub(crate) fn teardown(&self) {
        self.single.lock().clear();
        for rt in self.runtimes.lock().drain(..) {
            rt.shutdown_background();
        }
    }
}

impl Drop for LaneSet {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn build_runtime(label: &str, workers: usize) -> Result<Runtime, RuntimeError> {
    RuntimeBuilder::new_multi_thread()
        .worker_threads(workers.max(1))
        .thread_name(format!("grove-{label}"))
        .enable_all()
        .build()
        .map_err(|source| RuntimeError::LaneBuild {
            lane: Arc::from(label),
            source,
        })
}
