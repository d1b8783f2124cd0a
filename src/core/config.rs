//! # Global engine configuration.
//!
//! Provides [`EngineConfig`] centralized settings for the engine.
//!
//! Config is used in two ways:
//! 1. **Engine creation**: `Engine::builder().config(cfg).build()`
//! 2. **Scope defaults**: scopes built without an explicit lane or policy
//!    fall back to `default_lane` / `default_policy`
//!
//! ## Sentinel values
//! - `cpu_workers = 0` → sized from `available_parallelism`
//! - `io_workers = 0` → twice `available_parallelism`, clamped

use std::thread;
use std::time::Duration;

use crate::scopes::Policy;

use super::Lane;

/// Global configuration for the engine.
///
/// Defines:
/// - **Shutdown behavior**: grace period for graceful termination
/// - **Lane sizing**: worker counts for the cpu and io pools
/// - **Event system**: bus capacity for event delivery
/// - **Scope defaults**: lane and failure policy for scopes that set none
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to
/// avoid sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Maximum time to wait for graceful shutdown before force-terminating.
    ///
    /// When shutdown starts:
    /// - Every scope is cancelled, which sweeps every task tree
    /// - The engine waits up to `grace` for the arena to drain
    /// - If the window is exceeded, lanes are torn down anyway and
    ///   `RuntimeError::GraceExceeded` reports the stuck tasks
    pub grace: Duration,

    /// Worker threads for the `cpu` lane.
    ///
    /// - `0` = sized from `available_parallelism`
    /// - `n > 0` = exactly `n` workers
    pub cpu_workers: usize,

    /// Worker threads for the `io` lane.
    ///
    /// - `0` = twice `available_parallelism`, clamped to `[2, 64]`
    /// - `n > 0` = exactly `n` workers
    pub io_workers: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages
    /// will receive `Lagged` and skip older items. Minimum value is 1
    /// (enforced by Bus).
    pub bus_capacity: usize,

    /// Lane used by scopes that do not pick one and have no creating task to
    /// inherit from.
    pub default_lane: Lane,

    /// Failure policy used by scopes that do not pick one.
    pub default_policy: Policy,
}

impl EngineConfig {
    /// Resolved worker count for the `cpu` lane.
    #[inline]
    pub fn cpu_workers_resolved(&self) -> usize {
        if self.cpu_workers == 0 {
            parallelism()
        } else {
            self.cpu_workers
        }
    }

    /// Resolved worker count for the `io` lane.
    #[inline]
    pub fn io_workers_resolved(&self) -> usize {
        if self.io_workers == 0 {
            (parallelism() * 2).clamp(2, 64)
        } else {
            self.io_workers
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for EngineConfig {
    /// Default configuration:
    ///
    /// - `grace = 60s` (reasonable graceful shutdown window)
    /// - `cpu_workers = 0` (sized from the machine)
    /// - `io_workers = 0` (sized from the machine)
    /// - `bus_capacity = 1024` (good baseline)
    /// - `default_lane = Lane::CpuBound`
    /// - `default_policy = Policy::FailFast`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(60),
            cpu_workers: 0,
            io_workers: 0,
            bus_capacity: 1024,
            default_lane: Lane::CpuBound,
            default_policy: Policy::FailFast,
        }
    }
}

fn parallelism() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.grace, Duration::from_secs(60));
        assert_eq!(cfg.default_lane, Lane::CpuBound);
        assert_eq!(cfg.default_policy, Policy::FailFast);
        assert!(cfg.cpu_workers_resolved() >= 1);
        assert!(cfg.io_workers_resolved() >= 2);
    }

    #[test]
    fn test_explicit_sizes_win_over_sentinels() {
        let cfg = EngineConfig {
            cpu_workers: 3,
            io_workers: 5,
            bus_capacity: 0,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.cpu_workers_resolved(), 3);
        assert_eq!(cfg.io_workers_resolved(), 5);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
