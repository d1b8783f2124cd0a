//! Task identity, lifecycle, and the shared tree arena.

mod arena;
mod cancel;
mod node;
mod state;

pub use cancel::{CancelKind, CancelReason};
pub use node::{Outcome, TaskId};
pub use state::TaskState;

pub(crate) use arena::{TaskTree, Terminal};
pub(crate) use node::{CompletionCallback, TaskNode};
