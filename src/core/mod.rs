//! Engine core: lanes, configuration, and lifecycle.
//!
//! This module contains the embedded machinery behind [`Engine`]: the lane
//! runtimes every task body polls on, global configuration, and the shutdown
//! path.
//!
//! Modules:
//! - [`engine`]: the engine handle, scope registry, and graceful shutdown;
//! - [`builder`]: constructs the engine and wires the event plumbing;
//! - [`lanes`]: the named runtimes and the dispatch rules between them;
//! - [`config`]: sizing and defaults;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod config;
mod engine;
mod lanes;
mod shutdown;

pub use builder::EngineBuilder;
pub use config::EngineConfig;
pub use engine::Engine;
pub use lanes::Lane;

pub(crate) use engine::{EngineShared, EventSink};
pub(crate) use lanes::LaneSet;
