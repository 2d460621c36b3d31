//! Synchronous counterpart of the async tree walker.
//!
//! Same refcounting and ordering rules; members of a concurrent group are visited one
//! after another in array order (rollback and stop: reverse array order).

use std::sync::Arc;

use tracing::{debug, warn};

use crate::blocking::service::{BlockingGroup, BlockingNode};
use crate::error::LifecycleError;
use crate::lifecycle::{Acquire, Lifecycle, Release, State};
use crate::tree::Failures;

fn members(groups: &[BlockingGroup]) -> Vec<Vec<Arc<BlockingNode>>> {
    groups
        .iter()
        .filter(|g| !g.is_empty())
        .map(|g| g.members().iter().map(|h| h.node().clone()).collect())
        .collect()
}

fn acquire(node: &Arc<BlockingNode>) -> Result<(), LifecycleError> {
    match node.transition(Lifecycle::acquire) {
        Acquire::Start => start(node),
        Acquire::Shared => {
            debug!(service = %node.name, "dependency shared");
            Ok(())
        }
        // A start in flight on this thread means a cycle; on another thread, a race the
        // blocking runtime does not wait out.
        Acquire::Wait => Err(LifecycleError::DependencyUnavailable {
            service: node.name.clone(),
            state: State::Starting,
        }),
        Acquire::Rejected(state) => Err(LifecycleError::DependencyUnavailable {
            service: node.name.clone(),
            state,
        }),
    }
}

/// Starts a node already moved to `Starting`.
pub(crate) fn start(node: &Arc<BlockingNode>) -> Result<(), LifecycleError> {
    debug!(service = %node.name, "starting");
    let mut started: Vec<Arc<BlockingNode>> = Vec::new();

    let res = (|| {
        for group in members(&node.component.dependencies()) {
            for dep in group {
                acquire(&dep)?;
                started.push(dep);
            }
        }
        node.component
            .start()
            .map_err(|cause| LifecycleError::start_failed(&node.name, cause))
    })();

    match res {
        Ok(()) => {
            node.transition(Lifecycle::started);
            debug!(service = %node.name, "running");
            Ok(())
        }
        Err(err) => {
            node.transition(Lifecycle::abort_start);
            warn!(service = %node.name, error = %err, "start failed; rolling back");
            let mut failures = Failures::default();
            for dep in started.iter().rev() {
                failures.push_result(release(dep));
            }
            node.transition(|lc| lc.finish(false));
            Err(err.with_suppressed(failures.into_result().err()))
        }
    }
}

/// Releases `node` once; the last release stops it.
pub(crate) fn release(node: &Arc<BlockingNode>) -> Result<(), LifecycleError> {
    match node.transition(Lifecycle::release) {
        Release::Stop => stop(node),
        Release::Shared => Ok(()),
        Release::Ignored(state) => {
            debug!(service = %node.name, %state, "release ignored");
            Ok(())
        }
    }
}

fn stop(node: &Arc<BlockingNode>) -> Result<(), LifecycleError> {
    debug!(service = %node.name, "stopping");
    let mut failures = Failures::default();

    if let Err(cause) = node.component.stop() {
        let err = LifecycleError::stop_failed(&node.name, cause);
        warn!(service = %node.name, error = %err, "stop failed");
        failures.push(err);
    }
    for group in members(&node.component.dependencies()).into_iter().rev() {
        for dep in group.iter().rev() {
            failures.push_result(release(dep));
        }
    }

    node.transition(|lc| lc.finish(false));
    debug!(service = %node.name, "stopped");
    failures.into_result()
}
