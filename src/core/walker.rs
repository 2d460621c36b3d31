//! # Tree walker: dependency-ordered start and stop.
//!
//! ```text
//! acquire(node)
//!   ├─ Idle     → start(node)
//!   │               ├─ for group in dependencies():      (barrier between groups)
//!   │               │     join_all(acquire(member) ...)
//!   │               │     any failed? → rollback
//!   │               ├─ own start body  (raced against the termination cell)
//!   │               └─ Starting → Running
//!   ├─ Running  → dependents += 1
//!   ├─ Starting → wait for it to settle, acquire again
//!   └─ other    → DependencyUnavailable
//!
//! release(node)
//!   ├─ last dependent → stop(node)
//!   │                     ├─ cancel + drain tasks
//!   │                     ├─ own stop body
//!   │                     ├─ for group in dependencies().rev():
//!   │                     │     join_all(release(member) ...)
//!   │                     └─ Stopping → Stopped | Crashed
//!   └─ otherwise      → dependents -= 1
//! ```
//!
//! Start failures short-circuit the remaining groups. Stop failures never do; they are
//! collected and the first one is surfaced with the rest attached as suppressed.
//!
//! `acquire` and `release` recurse through boxed futures: the depth of the tree is not
//! known statically.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::anyhow;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::coordinator::Timeouts;
use crate::core::node::{Node, TreeContext};
use crate::core::panic_message;
use crate::core::service::{Group, ServiceContext};
use crate::core::termination::Outcome;
use crate::error::LifecycleError;
use crate::events::EventKind;
use crate::lifecycle::{Acquire, Lifecycle, Release, State};
use crate::tree::Failures;

/// Dependency groups resolved to nodes; empty groups are dropped.
type Tiers = Vec<Vec<Arc<Node>>>;

fn tiers(groups: &[Group]) -> Tiers {
    groups
        .iter()
        .filter(|g| !g.is_empty())
        .map(|g| g.members().iter().map(|h| h.node().clone()).collect())
        .collect()
}

/// Acquires `node` on behalf of a parent traversal, starting it if nobody has.
pub(crate) fn acquire(
    node: Arc<Node>,
    tree: Arc<TreeContext>,
) -> BoxFuture<'static, Result<(), LifecycleError>> {
    async move {
        loop {
            match node.transition(Acquire::Wait, Lifecycle::acquire) {
                Acquire::Start => return start(node, tree).await,
                Acquire::Shared => {
                    debug!(service = %node.name, dependents = node.dependents(), "dependency shared");
                    return Ok(());
                }
                Acquire::Wait => {
                    let mut rx = node.lifecycle.subscribe();
                    let _ = rx.wait_for(|lc| lc.state != State::Starting).await;
                }
                Acquire::Rejected(state) => {
                    return Err(LifecycleError::DependencyUnavailable {
                        service: node.name.clone(),
                        state,
                    });
                }
            }
        }
    }
    .boxed()
}

/// Starts a node already moved to `Starting`.
pub(crate) async fn start(node: Arc<Node>, tree: Arc<TreeContext>) -> Result<(), LifecycleError> {
    node.attach(tree.clone());
    node.tasks.open();
    debug!(service = %node.name, "starting");
    node.publish(EventKind::ServiceStarting);

    let mut started = Tiers::new();
    let res = match start_dependencies(&node, &tree, &mut started).await {
        Ok(()) => start_own(&node, &tree).await,
        Err(err) => Err(err),
    };

    match res {
        Ok(()) => {
            node.transition(false, Lifecycle::started);
            debug!(service = %node.name, "running");
            node.publish(EventKind::ServiceStarted);
            Ok(())
        }
        Err(err) => {
            let err = crash_cause(&tree, err);
            Err(rollback(&node, started, err).await)
        }
    }
}

/// A start cut short by a crash elsewhere in the tree reports the crash, not `Cancelled`.
fn crash_cause(tree: &TreeContext, err: LifecycleError) -> LifecycleError {
    if !matches!(err.primary(), LifecycleError::Cancelled { .. }) {
        return err;
    }
    match tree.termination.get() {
        Some(Outcome::Failed(cause)) => cause.clone().with_suppressed(err.suppressed().to_vec()),
        _ => err,
    }
}

async fn start_dependencies(
    node: &Arc<Node>,
    tree: &Arc<TreeContext>,
    started: &mut Tiers,
) -> Result<(), LifecycleError> {
    for tier in tiers(&node.component.dependencies()) {
        if tree.termination.is_resolved() {
            return Err(LifecycleError::Cancelled {
                service: node.name.clone(),
            });
        }

        let results = join_all(tier.iter().map(|dep| acquire(dep.clone(), tree.clone()))).await;

        let mut failures = Failures::default();
        let mut acquired = Vec::with_capacity(tier.len());
        for (dep, res) in tier.into_iter().zip(results) {
            match res {
                Ok(()) => acquired.push(dep),
                Err(err) => failures.push(err),
            }
        }
        started.push(acquired);
        failures.into_result()?;
    }
    Ok(())
}

async fn start_own(node: &Arc<Node>, tree: &Arc<TreeContext>) -> Result<(), LifecycleError> {
    let ctx = ServiceContext::new(node);
    tokio::select! {
        biased;
        _ = tree.termination.resolved() => Err(LifecycleError::Cancelled {
            service: node.name.clone(),
        }),
        res = AssertUnwindSafe(node.component.start(&ctx)).catch_unwind() => match res {
            Ok(res) => res.map_err(|cause| LifecycleError::start_failed(&node.name, cause)),
            Err(panic) => Err(LifecycleError::start_failed(
                &node.name,
                anyhow!("start panicked: {}", panic_message(panic.as_ref())),
            )),
        },
    }
}

/// Undoes a failed start: drains tasks spawned so far, then releases every dependency
/// this start acquired, newest group first. Returns `err` with rollback errors attached.
async fn rollback(node: &Arc<Node>, started: Tiers, err: LifecycleError) -> LifecycleError {
    node.transition(false, Lifecycle::abort_start);
    warn!(service = %node.name, error = %err, "start failed; rolling back");

    let budget = node.component.graceful_shutdown_timeout();
    let until = Instant::now() + budget;
    let timeouts = Arc::new(Timeouts::default());

    if !node.tasks.shutdown(until).await {
        timeouts.record(&node.name, budget);
    }
    let rolled_back = stop_tiers(started, until, &timeouts).await;

    let crashed = node.tasks.faulted();
    node.transition(false, |lc| lc.finish(crashed));
    node.publish_with_reason(EventKind::ServiceStartFailed, err.to_string());
    node.detach();

    err.with_suppressed(rolled_back.err())
}

/// Releases `node` once; the last release stops it.
pub(crate) fn release(
    node: Arc<Node>,
    deadline: Instant,
    timeouts: Arc<Timeouts>,
) -> BoxFuture<'static, Result<(), LifecycleError>> {
    async move {
        match node.transition(Release::Ignored(State::Idle), Lifecycle::release) {
            Release::Stop => stop(node, deadline, timeouts).await,
            Release::Shared => {
                debug!(service = %node.name, dependents = node.dependents(), "still shared; not stopping");
                Ok(())
            }
            Release::Ignored(state) => {
                debug!(service = %node.name, %state, "release ignored");
                Ok(())
            }
        }
    }
    .boxed()
}

/// Stops a node already moved to `Stopping`.
async fn stop(
    node: Arc<Node>,
    deadline: Instant,
    timeouts: Arc<Timeouts>,
) -> Result<(), LifecycleError> {
    debug!(service = %node.name, "stopping");
    node.publish(EventKind::ServiceStopping);

    let began = Instant::now();
    let until = deadline.min(began + node.component.graceful_shutdown_timeout());
    let mut failures = Failures::default();
    let mut late = !node.tasks.shutdown(until).await;

    if Instant::now() >= until {
        late = true;
        warn!(service = %node.name, "no time left; stop body skipped");
    } else {
        match tokio::time::timeout_at(until, node.component.stop()).await {
            Ok(Ok(())) => {}
            Ok(Err(cause)) => {
                let err = LifecycleError::stop_failed(&node.name, cause);
                warn!(service = %node.name, error = %err, "stop failed");
                node.publish_with_reason(EventKind::ServiceStopFailed, err.to_string());
                failures.push(err);
            }
            Err(_elapsed) => late = true,
        }
    }
    if late {
        timeouts.record(&node.name, until.saturating_duration_since(began));
    }

    let deps = tiers(&node.component.dependencies());
    failures.push_result(stop_tiers(deps, deadline, &timeouts).await);

    let crashed = node.tasks.faulted();
    node.transition(false, |lc| lc.finish(crashed));

    if crashed {
        let reason = node
            .termination()
            .and_then(|t| t.get())
            .map(|o| match o {
                Outcome::Failed(err) => err.to_string(),
                other => other.as_reason().to_string(),
            })
            .unwrap_or_default();
        debug!(service = %node.name, "crashed");
        node.publish_with_reason(EventKind::ServiceCrashed, reason);
    } else {
        debug!(service = %node.name, "stopped");
        node.publish(EventKind::ServiceStopped);
    }
    node.detach();

    failures.into_result()
}

/// Releases every tier, newest first; members of a tier concurrently.
async fn stop_tiers(
    tiers: Tiers,
    deadline: Instant,
    timeouts: &Arc<Timeouts>,
) -> Result<(), LifecycleError> {
    let mut failures = Failures::default();
    for tier in tiers.into_iter().rev() {
        let results = join_all(
            tier.into_iter()
                .map(|dep| release(dep, deadline, timeouts.clone())),
        )
        .await;
        for res in results {
            failures.push_result(res);
        }
    }
    failures.into_result()
}
