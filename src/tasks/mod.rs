//! # Task-side API: contexts, handles, and the driver.
//!
//! This module provides the types a task body works with:
//! - [`TaskContext`] - in-body capability handle (checkpoints, children, lanes)
//! - [`TaskHandle`] - awaitable handle to a submitted task
//! - [`ResultHandle`] - typed, single-shot result handle
//! - [`join_all`] - ordered fail-fast join over result handles

mod context;
mod driver;
mod handle;

pub use context::TaskContext;
pub use handle::{join_all, ResultHandle, TaskHandle};

pub(crate) use driver::drive;
