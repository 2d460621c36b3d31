//! # Shutdown coordinator.
//!
//! Drives the reverse traversal of a tree under one time budget: the root's
//! [`graceful_shutdown_timeout`](crate::Service::graceful_shutdown_timeout).
//!
//! ```text
//! shutdown(root)
//!   deadline = now + root.budget
//!   release(root, deadline) ──► every node: own work bounded by min(deadline, now + own budget)
//!   ├─ nothing late ──► publish(AllStoppedWithin)
//!   └─ some late    ──► publish(GraceExceeded), warn!
//! ```
//!
//! A timeout never fails the stop: it is recorded in the [`ShutdownReport`] and the tree
//! still ends terminal.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::lock;
use crate::core::node::Node;
use crate::core::walker;
use crate::error::LifecycleError;
use crate::events::{Event, EventKind};

/// One node whose stop work did not finish within its budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownTimeout {
    /// Name of the late service.
    pub service: Arc<str>,
    /// Budget the service was given (its own timeout, capped by the root deadline).
    pub budget: Duration,
}

impl fmt::Display for ShutdownTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.service, self.budget)
    }
}

/// Result of one coordinated shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Budget of the root.
    pub budget: Duration,
    /// Time the stop traversal took.
    pub elapsed: Duration,
    /// Nodes that ran out of time, in the order they were detected.
    pub timeouts: Vec<ShutdownTimeout>,
}

impl ShutdownReport {
    /// True if any node exceeded its budget.
    pub fn timed_out(&self) -> bool {
        !self.timeouts.is_empty()
    }

    /// Names of the late services.
    pub fn timed_out_services(&self) -> Vec<&str> {
        self.timeouts.iter().map(|t| &*t.service).collect()
    }
}

/// Timeout collector shared by the concurrent branches of one traversal.
#[derive(Debug, Default)]
pub(crate) struct Timeouts(Mutex<Vec<ShutdownTimeout>>);

impl Timeouts {
    pub(crate) fn record(&self, service: &Arc<str>, budget: Duration) {
        warn!(service = %service, budget = ?budget, "stop exceeded its budget");
        lock(&self.0).push(ShutdownTimeout {
            service: service.clone(),
            budget,
        });
    }

    pub(crate) fn take(&self) -> Vec<ShutdownTimeout> {
        std::mem::take(&mut *lock(&self.0))
    }
}

/// Releases `node` once and stops whatever that release makes unused, under the node's
/// budget.
pub(crate) async fn shutdown(node: Arc<Node>) -> (ShutdownReport, Result<(), LifecycleError>) {
    let budget = node.component.graceful_shutdown_timeout();
    let started = Instant::now();
    let deadline = started + budget;

    // Held until the outcome is published: the nodes detach from the tree as they stop.
    let tree = node.tree();
    let timeouts = Arc::new(Timeouts::default());

    let res = walker::release(node.clone(), deadline, timeouts.clone()).await;

    let report = ShutdownReport {
        budget,
        elapsed: started.elapsed(),
        timeouts: timeouts.take(),
    };

    if let Some(tree) = &tree {
        if report.timed_out() {
            let late = report
                .timeouts
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            warn!(service = %node.name, late = %late, "shutdown grace exceeded");
            tree.publish(
                Event::new(EventKind::GraceExceeded)
                    .with_service(node.name.clone())
                    .with_timeout(budget)
                    .with_reason(late),
            );
        } else {
            debug!(service = %node.name, elapsed = ?report.elapsed, "stopped within grace");
            tree.publish(
                Event::new(EventKind::AllStoppedWithin)
                    .with_service(node.name.clone())
                    .with_timeout(budget),
            );
        }
    }

    node.keep_report(report.clone());
    (report, res)
}
