use std::sync::Arc;

use crate::error::RuntimeError;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::tree::TaskTree;

use super::engine::{Engine, EngineShared, EventSink};
use super::{EngineConfig, LaneSet};

/// Builder for constructing an [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl EngineBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            subscribers: Vec::new(),
        }
    }

    /// Replaces the configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive engine events (task lifecycle, failures, shutdown)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the engine: lane runtimes, task arena, event plumbing, and one
    /// worker per subscriber.
    ///
    /// Fails with [`RuntimeError::LaneBuild`] when a lane runtime cannot be
    /// created. Does not require an ambient tokio runtime; the engine brings
    /// its own.
    pub fn build(self) -> Result<Engine, RuntimeError> {
        let bus = Bus::new(self.config.bus_capacity_clamped());
        let lanes = LaneSet::build(&self.config)?;

        let set = if self.subscribers.is_empty() {
            None
        } else {
            Some(Arc::new(SubscriberSet::new(
                self.subscribers,
                bus.clone(),
                lanes.io_handle(),
            )))
        };
        let sink = EventSink::new(bus, set.clone());
        let tree = TaskTree::new(sink.clone());

        let shared = Arc::new(EngineShared::new(self.config, lanes, tree, sink, set));
        Ok(Engine::from_shared(shared))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
