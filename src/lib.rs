//! # stackvisor
//!
//! **Stackvisor** is a service lifecycle orchestrator for Rust.
//!
//! It starts a tree of dependent components in dependency order, supervises the
//! background tasks they spawn, propagates crashes to the whole stack, and stops
//! everything in reverse order within a bounded time budget.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │   ServiceHandle (root)       │
//!                 │   run / start / stop / scope │
//!                 └──────────────┬───────────────┘
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  TreeContext (one per root traversal)                             │
//! │  - Termination cell (write-once: Stopped / Interrupted / Failed)  │
//! │  - Bus (broadcast events)                                         │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//!     │  Node: db    │   │  Node: cache │   │  Node: api   │   │
//!     │  lifecycle   │   │  lifecycle   │   │  lifecycle   │   │
//!     │  TaskSet     │   │  TaskSet     │   │  TaskSet     │   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘   │
//!      │ Publishes        │                  │ task crash      │
//!      │ - ServiceStarting│                  │ ─► resolve cell │
//!      │ - ServiceStopped │                  │    (Failed)     │
//!      ▼                  ▼                  ▼                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │                   (capacity: Config::bus_capacity)                │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  tree listener         │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                            (per-sub queues)
//!                         ┌─────────┼─────────┐
//!                         ▼         ▼         ▼
//!                      worker1   worker2   workerN
//! ```
//!
//! ### Lifecycle
//! ```text
//! run()
//!   ├─► start tree
//!   │     for group in dependencies():          (groups in order, members concurrently)
//!   │         acquire(member)                   (first acquirer starts, others share)
//!   │     failed? ─► stop what started, in reverse ─► Err(cause)
//!   │     own start body ─► Running
//!   ├─► wait: stop request │ task crash │ OS interrupt
//!   ├─► stop tree (budget = root's graceful_shutdown_timeout)
//!   │     cancel + drain tasks ─► own stop body ─► release groups in reverse
//!   │     last release stops a shared dependency
//!   └─► re-raise the termination cause
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                          |
//! |-------------------|-----------------------------------------------------------------|---------------------------------------------|
//! | **Services**      | Components with start/stop bodies and ordered dependencies.     | [`Service`], [`ServiceHandle`], [`Group`]   |
//! | **Tasks**         | Supervised background work; a failure crashes the stack.        | [`ServiceContext`], [`TaskHandle`]          |
//! | **Shutdown**      | Bounded reverse traversal with a timeout report.                | [`ShutdownReport`], [`ShutdownTimeout`]     |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, custom).          | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed lifecycle and task errors with suppressed detail.         | [`LifecycleError`], [`TaskError`]           |
//! | **Configuration** | Bus capacity and OS signal handling of a root.                  | [`Config`], [`ServiceBuilder`]              |
//! | **Blocking**      | The same lifecycle on the calling thread.                       | [`blocking::BlockingHandle`]                |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use stackvisor::{Group, Service, ServiceContext, ServiceHandle, TaskError};
//!
//! struct Db;
//!
//! #[async_trait]
//! impl Service for Db {}
//!
//! struct Api {
//!     db: ServiceHandle,
//! }
//!
//! #[async_trait]
//! impl Service for Api {
//!     fn dependencies(&self) -> Vec<Group> {
//!         vec![self.db.clone().into()]
//!     }
//!
//!     async fn start(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
//!         let stopper = ctx.clone();
//!         ctx.add_task("serve", move |token| async move {
//!             tokio::select! {
//!                 _ = token.cancelled() => Err(TaskError::Canceled),
//!                 _ = tokio::time::sleep(Duration::from_millis(10)) => {
//!                     stopper.request_stop();
//!                     Ok(())
//!                 }
//!             }
//!         })?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), stackvisor::LifecycleError> {
//!     let db = ServiceHandle::new(Db);
//!     let api = ServiceHandle::new(Api { db: db.clone() });
//!
//!     api.run().await?;
//!     assert!(!db.running());
//!     Ok(())
//! }
//! ```

pub mod blocking;
mod core;
mod error;
mod events;
mod lifecycle;
mod subscribers;
mod tree;

// ---- Public re-exports ----

pub use crate::core::{
    wait_for_shutdown_signal, Config, Group, Outcome, Service, ServiceBuilder, ServiceContext,
    ServiceHandle, ShutdownReport, ShutdownTimeout, StateWatch, TaskHandle,
    DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT,
};
pub use error::{Cause, LifecycleError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use lifecycle::State;
pub use subscribers::{Subscribe, SubscriberSet};
pub use tree::DependencyGroup;

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
