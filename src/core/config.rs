//! # Runtime configuration.
//!
//! Provides [`Config`] centralized settings applied by the root of a traversal.
//!
//! Config is used in one place: [`ServiceBuilder::with_config`](crate::ServiceBuilder::with_config).
//! Only the service that a traversal is started on (the root) reads it; dependencies share
//! the root's bus and signal handling.
//!
//! ## Sentinel values
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

/// Shutdown budget of a service that does not override
/// [`Service::graceful_shutdown_timeout`](crate::Service::graceful_shutdown_timeout).
pub const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a service tree root.
///
/// ## Field semantics
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `handle_os_signals`: whether [`ServiceHandle::run`](crate::ServiceHandle::run) treats
///   SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere) as a stop request
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages will
    /// receive `Lagged` and skip older items.
    pub bus_capacity: usize,

    /// Listen for OS termination signals while `run()` waits.
    ///
    /// A received signal ends the run like a stop request, and `run()` returns
    /// [`LifecycleError::Interrupted`](crate::LifecycleError::Interrupted).
    pub handle_os_signals: bool,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024` (good baseline)
    /// - `handle_os_signals = false` (embedders opt in)
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            handle_os_signals: false,
        }
    }
}
