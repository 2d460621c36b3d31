//! # LogWriter - forwards lifecycle events to `tracing`
//!
//! A minimal subscriber that turns incoming [`Event`]s into `tracing` records under the
//! `stackvisor::events` target. Install any `tracing` subscriber to see them.
//!
//! ## Example output (with `tracing_subscriber::fmt`)
//! ```text
//! INFO stackvisor::events: starting service="db"
//! INFO stackvisor::events: started service="db"
//! WARN stackvisor::events: task failed service="api" task="poller" reason="connection refused"
//! ERROR stackvisor::events: crashed service="api" reason="..."
//! WARN stackvisor::events: grace exceeded service="api" timeout_ms=1000 reason="db"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

const TARGET: &str = "stackvisor::events";

/// Event writer subscriber.
#[derive(Debug, Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let service = e.service.as_deref().unwrap_or("-");
        let task = e.task.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::ServiceStarting => info!(target: TARGET, service, "starting"),
            EventKind::ServiceStarted => info!(target: TARGET, service, "started"),
            EventKind::ServiceStartFailed => {
                warn!(target: TARGET, service, reason, "start failed")
            }
            EventKind::ServiceStopping => info!(target: TARGET, service, "stopping"),
            EventKind::ServiceStopped => info!(target: TARGET, service, "stopped"),
            EventKind::ServiceStopFailed => {
                warn!(target: TARGET, service, reason, "stop failed")
            }
            EventKind::ServiceCrashed => error!(target: TARGET, service, reason, "crashed"),
            EventKind::TaskAdded => debug!(target: TARGET, service, task, "task added"),
            EventKind::TaskFailed => {
                warn!(target: TARGET, service, task, reason, "task failed")
            }
            EventKind::TaskRemoved => debug!(target: TARGET, service, task, "task removed"),
            EventKind::StopRequested => {
                info!(target: TARGET, service, reason, "stop requested")
            }
            EventKind::AllStoppedWithin => {
                info!(target: TARGET, service, timeout_ms = e.timeout_ms, "all stopped within grace")
            }
            EventKind::GraceExceeded => {
                warn!(target: TARGET, service, timeout_ms = e.timeout_ms, reason, "grace exceeded")
            }
            EventKind::SubscriberOverflow => {
                warn!(target: TARGET, subscriber = task, reason, "subscriber overflow")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
