//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait and the fan-out machinery that
//! delivers engine events to registered subscribers.
//!
//! ```text
//! Event flow:
//!   engine ── publish(Event) ──┬──► Bus (broadcast, Engine::subscribe)
//!                              │
//!                              └──► SubscriberSet::emit
//!                                        │
//!                            ┌───────────┼───────────┐
//!                            ▼           ▼           ▼
//!                        LogWriter    Metrics     Custom
//!                        (logging)
//! ```
//!
//! Subscribers never run inline with the publisher: each one has a bounded
//! queue and a dedicated worker on the engine's io lane, so a slow or
//! panicking subscriber cannot stall task execution.

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
