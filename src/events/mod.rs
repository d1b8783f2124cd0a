//! Engine events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by scopes, task drivers, the
//! shutdown path, and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `TaskTree` (terminal transitions), `Scope` (open/cancel),
//!   `Engine` (shutdown accounting), `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `Engine::subscribe()` receivers; registered subscribers
//!   are fed through `SubscriberSet` queues at publish time.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
