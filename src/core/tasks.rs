//! # Background task supervisor.
//!
//! Every node owns a [`TaskSet`]: the live background tasks registered through
//! `add_task` while the node is starting or running.
//!
//! ## Outcomes
//! ```text
//! task future ──► catch_unwind
//!     ├─ Ok(()) / Err(Canceled)            → TaskRemoved (silently leaves the live set)
//!     ├─ Err(e), node stopping             → TaskFailed, logged as suppressed
//!     └─ Err(e) / panic, node running      → TaskFailed
//!                                            └─► termination.resolve(Failed(Crashed))
//!                                                 (the whole tree stops)
//! ```
//!
//! ## Rules
//! - Each task receives a child of the node's [`CancellationToken`].
//! - When the node begins stopping the set is closed, the token cancelled and every task
//!   awaited within the node's budget; stragglers are aborted and still awaited, so no task
//!   outlives its service's `stop` body.
//! - Finished tasks are reaped on every `add_task` and when counting live tasks.
//! - A crash marks the set as faulted: its service ends `Crashed`, while the services
//!   stopped because of it end `Stopped`.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::core::lock;
use crate::core::node::TreeContext;
use crate::core::termination::Outcome;
use crate::error::{LifecycleError, TaskError};
use crate::events::{Event, EventKind};

/// Handle to a supervised background task.
#[derive(Debug)]
pub struct TaskHandle {
    name: Arc<str>,
    token: CancellationToken,
    abort: AbortHandle,
}

impl TaskHandle {
    /// Task name given to `add_task`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requests cooperative cancellation through the task's token.
    ///
    /// Errors returned after cancellation are not treated as a crash.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Aborts the task at its next suspension point.
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// True once the task has completed, failed or been aborted.
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

struct Inner {
    set: JoinSet<()>,
    token: CancellationToken,
    open: bool,
}

/// Live background tasks of one node.
pub(crate) struct TaskSet {
    inner: Mutex<Inner>,
    faulted: Arc<AtomicBool>,
}

impl TaskSet {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                set: JoinSet::new(),
                token: CancellationToken::new(),
                open: false,
            }),
            faulted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Records that this service's work failed while it was running.
    pub(crate) fn mark_faulted(&self) {
        self.faulted.store(true, Ordering::Release);
    }

    pub(crate) fn faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    /// Accepts tasks until the next [`TaskSet::shutdown`].
    pub(crate) fn open(&self) {
        let mut inner = lock(&self.inner);
        inner.open = true;
        inner.token = CancellationToken::new();
    }

    /// Schedules `f(token)` under supervision. Returns `None` once the set is closed.
    pub(crate) fn spawn<F, Fut>(
        &self,
        service: &Arc<str>,
        name: Arc<str>,
        tree: Arc<TreeContext>,
        f: F,
    ) -> Option<TaskHandle>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let token = {
            let inner = lock(&self.inner);
            if !inner.open {
                return None;
            }
            inner.token.child_token()
        };

        // Built outside the lock: the closure may call back into the service.
        let fut = f(token.clone());

        let abort = {
            let mut inner = lock(&self.inner);
            if !inner.open {
                return None;
            }
            while inner.set.try_join_next().is_some() {}
            inner.set.spawn(supervise(
                service.clone(),
                name.clone(),
                token.clone(),
                tree.clone(),
                self.faulted.clone(),
                fut,
            ))
        };

        debug!(service = %service, task = %name, "task added");
        tree.publish(
            Event::new(EventKind::TaskAdded)
                .with_service(service.clone())
                .with_task(name.clone()),
        );
        Some(TaskHandle { name, token, abort })
    }

    /// Number of tasks that have not finished yet.
    pub(crate) fn live(&self) -> usize {
        let mut inner = lock(&self.inner);
        while inner.set.try_join_next().is_some() {}
        inner.set.len()
    }

    /// Closes the set, cancels every task and awaits them until `until`.
    ///
    /// Returns `false` if tasks had to be aborted because `until` passed.
    pub(crate) async fn shutdown(&self, until: Instant) -> bool {
        let mut set = {
            let mut inner = lock(&self.inner);
            inner.open = false;
            inner.token.cancel();
            std::mem::take(&mut inner.set)
        };
        if set.is_empty() {
            return true;
        }

        let drained = tokio::time::timeout_at(until, async {
            while set.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if !drained {
            set.shutdown().await;
        }
        drained
    }
}

/// Runs one task and turns an unhandled failure into a crash of the whole tree.
async fn supervise<Fut>(
    service: Arc<str>,
    task: Arc<str>,
    token: CancellationToken,
    tree: Arc<TreeContext>,
    faulted: Arc<AtomicBool>,
    fut: Fut,
) where
    Fut: Future<Output = Result<(), TaskError>> + Send,
{
    let res = match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(res) => res,
        Err(panic) => Err(TaskError::Panicked {
            info: panic_message(panic.as_ref()),
        }),
    };

    let error = match res {
        Ok(()) | Err(TaskError::Canceled) => {
            tree.publish(
                Event::new(EventKind::TaskRemoved)
                    .with_service(service)
                    .with_task(task),
            );
            return;
        }
        Err(error) => error,
    };

    tree.publish(
        Event::new(EventKind::TaskFailed)
            .with_service(service.clone())
            .with_task(task.clone())
            .with_reason(error.to_string()),
    );

    if token.is_cancelled() {
        warn!(service = %service, task = %task, %error, "task failed after cancellation (suppressed)");
        return;
    }

    error!(service = %service, task = %task, %error, "task failed; stopping the stack");
    faulted.store(true, Ordering::Release);
    let crash = LifecycleError::Crashed {
        service,
        task,
        error,
    };
    tree.termination.resolve(Outcome::Failed(crash));
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
