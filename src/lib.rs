//! # taskgrove
//!
//! **Taskgrove** is a structured-concurrency task engine for Rust.
//!
//! It runs async tasks as trees: every task belongs to a scope, children
//! belong to parents, cancellation sweeps whole subtrees, and a parent only
//! settles once all of its children have. The crate is designed as a building
//! block for pipelines and services that need predictable teardown.
//!
//! ## Architecture
//! ### Overview
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Engine                                                          │
//! │  - lanes (main / cpu / io / single:* / unconfined runtimes)      │
//! │  - task arena (every live task, all state transitions)           │
//! │  - Bus (broadcast events) + SubscriberSet (per-sub queues)       │
//! └───────┬─────────────────────────────────┬────────────────────────┘
//!         ▼                                 ▼
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │ Scope "ingest"            │   │ Scope "jobs"              │
//! │ policy: FailFast          │   │ policy: Supervisor        │
//! │                           │   │                           │
//! │   task #1 (main)          │   │   task #4 (cpu)           │
//! │    ├── task #2 (cpu)      │   │   task #5 (single:db)     │
//! │    └── task #3 (io)       │   │                           │
//! └───────────────────────────┘   └───────────────────────────┘
//!
//! Cancellation flows down: cancelling task #1 sweeps #2 and #3 with it,
//! and cancelling a scope sweeps every tree under it. Failures flow up:
//! a failed task reports to its scope, and the scope's policy decides
//! whether the siblings keep running.
//!
//! Event flow:
//!   drivers / scopes / shutdown ── publish ──┬──► Bus ──► Engine::subscribe()
//!                                            │
//!                                            └──► SubscriberSet
//!                                                   ├──► worker ──► sub1.on_event()
//!                                                   └──► worker ──► sub2.on_event()
//! ```
//!
//! ### Task lifecycle
//! ```text
//! submit ──► Active ──┬── body returns value ──► Completing ──► Completed
//!                     │                              │
//!                     │          cancel while waiting└──────────► Cancelled
//!                     │
//!                     ├── cancel requested ──► Cancelling ──────► Cancelled
//!                     │
//!                     └── body errors or panics ──► Failing ────► Failed
//!
//! A task in Completing/Cancelling/Failing is waiting for its children to
//! settle; the terminal states are final and exactly one is ever reached.
//! Cancellation is cooperative: bodies observe it at checkpoints
//! (`cx.checkpoint()`, `cx.sleep()`, `cx.yield_now()`, child submission,
//! `join`), never between two polls of ordinary awaits.
//! ```
//!
//! ## Features
//! | Area               | Description                                                             | Key types / traits                             |
//! |--------------------|-------------------------------------------------------------------------|------------------------------------------------|
//! | **Scopes**         | Group task trees, cancel them as one, pick a failure policy.            | [`Scope`], [`Policy`]                          |
//! | **Tasks**          | Hierarchical cancellable tasks with awaitable handles.                  | [`TaskContext`], [`TaskHandle`], [`ResultHandle`] |
//! | **Lanes**          | Route task bodies onto named runtimes, ordered or pooled.               | [`Lane`]                                       |
//! | **Cancellation**   | Cooperative checkpoints, subtree sweeps, first-reason-wins records.     | [`CancelReason`], [`CancelKind`]               |
//! | **Subscriber API** | Hook into lifecycle events (logging, metrics, custom subscribers).      | [`Subscribe`]                                  |
//! | **Errors**         | Typed errors for task bodies and the engine.                            | [`TaskError`], [`RuntimeError`]                |
//! | **Configuration**  | Centralize engine settings.                                             | [`EngineConfig`]                               |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use taskgrove::{Engine, Lane, Policy, TaskError};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::builder().build()?;
//!     let scope = engine.scope("pipeline").policy(Policy::Supervisor).build();
//!
//!     // A parent task fans out to two children and combines their values.
//!     let total = scope.spawn(|cx| async move {
//!         let left = cx.spawn(|cx| async move {
//!             cx.sleep(Duration::from_millis(5)).await?;
//!             Ok::<u32, TaskError>(3)
//!         })?;
//!         let right = cx.spawn_on(Lane::IoBound, |cx| async move {
//!             cx.checkpoint()?;
//!             Ok::<u32, TaskError>(4)
//!         })?;
//!         Ok::<u32, TaskError>(left.join(&cx).await? + right.join(&cx).await?)
//!     });
//!
//!     assert_eq!(total.wait().await?, 7);
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod scopes;
mod subscribers;
mod tasks;
mod tree;

// ---- Public re-exports ----

pub use core::{Engine, EngineBuilder, EngineConfig, Lane};
pub use error::{RuntimeError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use scopes::{Policy, Scope, ScopeBuilder};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{join_all, ResultHandle, TaskContext, TaskHandle};
pub use tree::{CancelKind, CancelReason, Outcome, TaskId, TaskState};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
