//! # Embedder-facing handle of one service instance.
//!
//! ```text
//! run()   = start() ─► wait for termination (or OS interrupt) ─► stop() ─► re-raise cause
//! scope() = start() ─► body(handle)        (aborted if the tree terminates) ─► stop()
//! ```
//!
//! The service on which `start`, `run` or `scope` is called is the *root* of the
//! traversal: its configuration, subscribers and shutdown budget apply to the whole tree.
//! Every other service in the tree is acquired as a dependency.
//!
//! Dropping a `start()`, `run()` or `scope()` future stops the tree in the background, the
//! same way an explicit stop request would. A start still in flight is cancelled and rolls
//! back what it already started.

use std::fmt;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::builder::ServiceBuilder;
use crate::core::coordinator::{self, ShutdownReport};
use crate::core::node::{Node, TreeContext};
use crate::core::panic_message;
use crate::core::service::Service;
use crate::core::shutdown::interrupted;
use crate::core::tasks::TaskHandle;
use crate::core::termination::{Outcome, Termination};
use crate::core::walker;
use crate::error::{merge, LifecycleError, TaskError};
use crate::lifecycle::{Lifecycle, State};

/// Shared handle that owns the lifecycle of one component instance.
///
/// Clones refer to the same instance; identity is by pointer ([`ServiceHandle::ptr_eq`]).
#[derive(Clone)]
pub struct ServiceHandle {
    node: Arc<Node>,
}

impl ServiceHandle {
    /// Wraps `service` with the default configuration.
    pub fn new<S: Service>(service: S) -> Self {
        ServiceBuilder::new(service).build()
    }

    /// Wraps an already shared component with the default configuration.
    pub fn from_arc(service: Arc<dyn Service>) -> Self {
        ServiceBuilder::from_arc(service).build()
    }

    /// Starts configuring a handle for `service`.
    pub fn builder<S: Service>(service: S) -> ServiceBuilder {
        ServiceBuilder::new(service)
    }

    pub(crate) fn from_node(node: Arc<Node>) -> Self {
        Self { node }
    }

    pub(crate) fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Name reported by [`Service::name`].
    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.node.state()
    }

    /// True iff the state is [`State::Running`].
    pub fn running(&self) -> bool {
        self.state() == State::Running
    }

    /// Watches state changes of this instance.
    pub fn subscribe_state(&self) -> StateWatch {
        StateWatch {
            rx: self.node.lifecycle.subscribe(),
        }
    }

    /// True if both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &ServiceHandle) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// Starts the dependency tree, then the service itself.
    ///
    /// On failure every dependency started by this call is stopped again before the error
    /// is returned, and the instance ends [`State::Stopped`].
    ///
    /// # Errors
    /// - [`LifecycleError::AlreadyStarted`] if the instance is not idle;
    /// - the first start failure of the tree, with rollback errors attached as suppressed.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        let node = &self.node;
        node.transition(Err(State::Idle), Lifecycle::begin)
            .map_err(|state| LifecycleError::AlreadyStarted {
                service: node.name.clone(),
                state,
            })?;
        node.root_held.store(true, Ordering::Release);

        let tree = TreeContext::for_root(&node.config, &node.subscribers);
        node.attach(tree.clone());

        // The traversal runs on its own task: dropping this future cancels the start
        // instead of abandoning it half way, and the task rolls back.
        let traversal = tokio::spawn({
            let node = node.clone();
            let tree = tree.clone();
            async move {
                let res = walker::start(node.clone(), tree.clone()).await;
                if let Err(err) = &res {
                    node.root_held.store(false, Ordering::Release);
                    tree.termination.resolve(Outcome::Failed(err.clone()));
                }
                res
            }
        });
        let guard = StopOnDrop::armed(self);

        let res = match traversal.await {
            Ok(res) => res,
            Err(err) if err.is_panic() => {
                let info = panic_message(err.into_panic().as_ref());
                let err = LifecycleError::start_failed(
                    &node.name,
                    anyhow!("start traversal panicked: {info}"),
                );
                node.root_held.store(false, Ordering::Release);
                tree.termination.resolve(Outcome::Failed(err.clone()));
                Err(err)
            }
            Err(_) => Err(LifecycleError::Cancelled {
                service: node.name.clone(),
            }),
        };
        guard.disarm();
        res
    }

    /// Stops the tree started by [`ServiceHandle::start`] within this service's
    /// [`graceful_shutdown_timeout`](Service::graceful_shutdown_timeout).
    ///
    /// A start still in flight is cancelled first. Running out of time is not an error; it
    /// is listed in the returned [`ShutdownReport`].
    ///
    /// # Errors
    /// - [`LifecycleError::NotRunning`] if there is nothing to stop (never started, or
    ///   already stopped);
    /// - the first stop failure of the tree, with later ones attached as suppressed.
    pub async fn stop(&self) -> Result<ShutdownReport, LifecycleError> {
        match self.release_root().await {
            Some((report, res)) => res.map(|()| report),
            None => Err(self.not_running()),
        }
    }

    /// Starts the tree, waits until it is asked to terminate, stops it, and returns the
    /// termination cause.
    ///
    /// # Errors
    /// - any error of [`ServiceHandle::start`];
    /// - the crash that ended the run;
    /// - [`LifecycleError::Interrupted`] on an OS signal, if
    ///   [`Config::handle_os_signals`](crate::Config::handle_os_signals) is set;
    /// - stop failures, attached as suppressed to any of the above.
    pub async fn run(&self) -> Result<(), LifecycleError> {
        self.start().await?;
        let termination = self.termination_cell()?;
        let guard = StopOnDrop::armed(self);

        tokio::select! {
            _ = termination.resolved() => {}
            _ = interrupted(self.node.config.handle_os_signals, &self.node.name) => {
                self.node.request_stop(Outcome::Interrupted);
            }
        }

        let stopped = self.stop_or_await().await;
        guard.disarm();

        let outcome = termination.get().cloned().unwrap_or(Outcome::Stopped);
        merge(outcome.into_result(), stopped)
    }

    /// Waits for the termination signal of the tree this instance runs in.
    ///
    /// # Errors
    /// - [`LifecycleError::NotRunning`] if the instance was never started (or is still
    ///   starting);
    /// - the cause that terminated the tree, if it was an error.
    pub async fn wait(&self) -> Result<(), LifecycleError> {
        if matches!(self.state(), State::Idle | State::Starting) {
            return Err(self.not_running());
        }
        self.termination_cell()?.wait().await.into_result()
    }

    /// Resolves the termination signal with a clean stop.
    ///
    /// Returns `false` if it was already resolved or the instance was never started.
    pub fn request_stop(&self) -> bool {
        self.node.request_stop(Outcome::Stopped)
    }

    /// Schedules a supervised background task; see [`ServiceContext::add_task`].
    ///
    /// [`ServiceContext::add_task`]: crate::ServiceContext::add_task
    pub fn add_task<F, Fut>(
        &self,
        name: impl Into<Arc<str>>,
        f: F,
    ) -> Result<TaskHandle, LifecycleError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.node.add_task(name.into(), f)
    }

    /// Scoped acquisition: starts the tree, runs `body`, and stops the tree on every exit
    /// path.
    ///
    /// If the tree terminates while `body` runs (crash or stop request), `body` is dropped
    /// at its next suspension point.
    ///
    /// # Errors
    /// - any error of [`ServiceHandle::start`] (`body` never runs);
    /// - [`LifecycleError::ScopeFailed`] if `body` fails; this becomes the stop cause and
    ///   the services end [`State::Crashed`];
    /// - the crash that aborted `body`, or [`LifecycleError::Cancelled`] if a clean stop
    ///   request did;
    /// - stop failures, attached as suppressed.
    pub async fn scope<F, Fut, T>(&self, body: F) -> Result<T, LifecycleError>
    where
        F: FnOnce(ServiceHandle) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.start().await?;
        let termination = self.termination_cell()?;
        let guard = StopOnDrop::armed(self);

        let finished = tokio::select! {
            biased;
            _ = termination.resolved() => None,
            res = body(self.clone()) => Some(res),
        };

        let res = match finished {
            Some(Ok(value)) => {
                self.node.request_stop(Outcome::Stopped);
                Ok(value)
            }
            Some(Err(cause)) => {
                let err = LifecycleError::ScopeFailed {
                    service: self.node.name.clone(),
                    cause: Arc::new(cause),
                };
                self.node.tasks.mark_faulted();
                self.node.request_stop(Outcome::Failed(err.clone()));
                Err(err)
            }
            None => Err(LifecycleError::Cancelled {
                service: self.node.name.clone(),
            }),
        };

        let stopped = self.stop_or_await().await;
        guard.disarm();

        // A cause decided before the body finished wins over the body's own result.
        let res = match (res, termination.get()) {
            (Err(LifecycleError::Cancelled { .. }), Some(Outcome::Failed(cause))) => {
                Err(cause.clone())
            }
            (Err(LifecycleError::Cancelled { .. }), Some(Outcome::Interrupted)) => {
                Err(LifecycleError::Interrupted)
            }
            (res, _) => res,
        };
        match (res, stopped) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), stopped) => Err(err.with_suppressed(stopped.err())),
        }
    }

    /// Outcome of the tree, once decided.
    pub fn termination(&self) -> Option<Outcome> {
        self.node.termination().and_then(|t| t.get().cloned())
    }

    /// Report of the last stop traversal rooted at this instance.
    pub fn shutdown_report(&self) -> Option<ShutdownReport> {
        self.node.report()
    }

    /// Number of background tasks still running.
    pub fn live_tasks(&self) -> usize {
        self.node.tasks.live()
    }

    fn not_running(&self) -> LifecycleError {
        LifecycleError::NotRunning {
            service: self.node.name.clone(),
            state: self.state(),
        }
    }

    fn termination_cell(&self) -> Result<Arc<Termination>, LifecycleError> {
        self.node
            .termination()
            .cloned()
            .ok_or_else(|| self.not_running())
    }

    /// Takes the embedder's hold on the tree and runs the coordinated stop.
    ///
    /// Returns `None` if another caller already took it.
    async fn release_root(&self) -> Option<(ShutdownReport, Result<(), LifecycleError>)> {
        if !self.node.root_held.swap(false, Ordering::AcqRel) {
            return None;
        }
        let mut rx = self.node.lifecycle.subscribe();
        let starting = rx.borrow().state == State::Starting;
        if starting {
            self.node.request_stop(Outcome::Stopped);
            // Either the start completes or its rollback runs to the end.
            let _ = rx
                .wait_for(|lc| !matches!(lc.state, State::Starting | State::Stopping))
                .await;
        }
        self.node.request_stop(Outcome::Stopped);
        Some(coordinator::shutdown(self.node.clone()).await)
    }

    /// Stops the tree, or waits for whoever is already stopping it.
    async fn stop_or_await(&self) -> Result<(), LifecycleError> {
        match self.release_root().await {
            Some((_report, res)) => res,
            None => {
                if self.node.dependents() == 0 {
                    self.node.terminated().await;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("name", &self.node.name)
            .field("state", &self.state())
            .field("dependents", &self.node.dependents())
            .finish()
    }
}

/// Stops the tree in the background if a `start`/`run`/`scope` future is dropped
/// mid-flight.
struct StopOnDrop<'a> {
    handle: Option<&'a ServiceHandle>,
}

impl<'a> StopOnDrop<'a> {
    fn armed(handle: &'a ServiceHandle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            return;
        };
        debug!(service = %handle.name(), "cancelled; stopping in background");
        let handle = handle.clone();
        rt.spawn(async move {
            let _ = handle.stop_or_await().await;
        });
    }
}

/// Receiver of state changes of one instance.
#[derive(Debug, Clone)]
pub struct StateWatch {
    rx: watch::Receiver<Lifecycle>,
}

impl StateWatch {
    /// Latest state.
    pub fn current(&self) -> State {
        self.rx.borrow().state
    }

    /// Waits for the next state different from the current one.
    ///
    /// Returns `None` once every handle of the instance is dropped.
    pub async fn changed(&mut self) -> Option<State> {
        let prev = self.rx.borrow_and_update().state;
        loop {
            self.rx.changed().await.ok()?;
            let state = self.rx.borrow_and_update().state;
            if state != prev {
                return Some(state);
            }
        }
    }

    /// Waits until `pred` holds for the state (immediately if it already does).
    pub async fn wait_for(&mut self, mut pred: impl FnMut(State) -> bool) -> State {
        let res = self.rx.wait_for(|lc| pred(lc.state)).await.map(|lc| lc.state);
        res.unwrap_or_else(|_| self.current())
    }
}
