//! Runtime core: the async lifecycle orchestrator.
//!
//! The public API from this module is [`ServiceHandle`] (built directly or through
//! [`ServiceBuilder`]) wrapping a user [`Service`].
//!
//! Internal modules:
//! - [`node`]: per-instance runtime record and the shared tree context;
//! - [`walker`]: recursive dependency-ordered start/stop with rollback;
//! - [`tasks`]: background task supervision and crash propagation;
//! - [`coordinator`]: bounded stop traversal and its report;
//! - [`termination`]: the write-once termination cell;
//! - [`shutdown`]: cross-platform shutdown signal handling.

use std::sync::{Mutex, MutexGuard, PoisonError};

mod builder;
mod config;
mod coordinator;
mod handle;
mod node;
mod service;
mod shutdown;
mod tasks;
mod termination;
mod walker;

#[cfg(test)]
mod tests;

pub use builder::ServiceBuilder;
pub use config::{Config, DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT};
pub use coordinator::{ShutdownReport, ShutdownTimeout};
pub use handle::{ServiceHandle, StateWatch};
pub use service::{Group, Service, ServiceContext};
pub use shutdown::wait_for_shutdown_signal;
pub use tasks::TaskHandle;
pub use termination::Outcome;

pub(crate) use tasks::panic_message;

/// Locks `m`, recovering the data if a holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
