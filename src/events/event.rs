//! # Runtime events emitted while a service tree starts, runs and stops.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Service events**: per-node lifecycle transitions (starting, started, stopping, ...)
//! - **Task events**: background task registration and termination
//! - **Shutdown events**: stop requests and the outcome of the shutdown budget
//! - **Subscriber events**: delivery problems of the fan-out itself
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the service and
//! task names, reasons and timeout budgets.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use stackvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ServiceStopFailed)
//!     .with_service("db")
//!     .with_reason("connection reset")
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::ServiceStopFailed);
//! assert_eq!(ev.service.as_deref(), Some("db"));
//! assert_eq!(ev.timeout_ms, Some(5_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Service events ===
    /// Service entered `Starting`.
    ///
    /// Sets: `service`.
    ServiceStarting,

    /// Service reached `Running`.
    ///
    /// Sets: `service`.
    ServiceStarted,

    /// Service start failed and its started dependencies were rolled back.
    ///
    /// Sets: `service`, `reason`.
    ServiceStartFailed,

    /// Service entered `Stopping`.
    ///
    /// Sets: `service`.
    ServiceStopping,

    /// Service reached `Stopped`.
    ///
    /// Sets: `service`.
    ServiceStopped,

    /// The service's own stop body returned an error (the traversal continues).
    ///
    /// Sets: `service`, `reason`.
    ServiceStopFailed,

    /// Service reached `Crashed`.
    ///
    /// Sets: `service`, `reason`.
    ServiceCrashed,

    // === Task events ===
    /// Background task scheduled.
    ///
    /// Sets: `service`, `task`.
    TaskAdded,

    /// Background task ended with an error.
    ///
    /// Sets: `service`, `task`, `reason`.
    TaskFailed,

    /// Background task ended without error (or observed cancellation).
    ///
    /// Sets: `service`, `task`.
    TaskRemoved,

    // === Shutdown events ===
    /// Stop requested for the tree rooted at `service`.
    ///
    /// Sets: `service`, `reason` (`"requested"`, `"interrupted"`, `"crashed"`).
    StopRequested,

    /// Whole-tree stop completed within the root's budget.
    ///
    /// Sets: `service`, `timeout_ms`.
    AllStoppedWithin,

    /// Some stop work exceeded its budget and was cut short.
    ///
    /// Sets: `service`, `timeout_ms`, `reason` (services that timed out).
    GraceExceeded,

    // === Subscriber events ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason`.
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the service, if applicable.
    pub service: Option<Arc<str>>,
    /// Name of the background task (or subscriber), if applicable.
    pub task: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Shutdown budget in milliseconds (compact).
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            task: None,
            reason: None,
            timeout_ms: None,
        }
    }

    /// Attaches a service name.
    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches a task name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a timeout budget (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }
}
