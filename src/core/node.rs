//! # Node: the runtime record behind a [`ServiceHandle`](crate::ServiceHandle).
//!
//! A node owns everything that is per-instance: the lifecycle cell, the attachment to the
//! tree it was started in, the live background tasks and the last shutdown report.
//!
//! ## Tree attachment
//! ```text
//! root.start()
//!   └─► TreeContext { termination, bus }   (created once, by the root)
//!         ├─► root.attach(tree)
//!         ├─► dep_a.attach(tree)             (same Arc)
//!         └─► dep_b.attach(tree)
//! stop / rollback of a node ──► detach()     (bus closes once every node detached)
//! ```
//!
//! The termination cell outlives the attachment so `wait()` keeps answering after stop.

use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::config::Config;
use crate::core::coordinator::ShutdownReport;
use crate::core::lock;
use crate::core::service::Service;
use crate::core::tasks::{TaskHandle, TaskSet};
use crate::core::termination::{Outcome, Termination};
use crate::error::{LifecycleError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::lifecycle::{Lifecycle, State};
use crate::subscribers::{Subscribe, SubscriberSet};

/// State shared by every node started under one root.
pub(crate) struct TreeContext {
    pub(crate) termination: Arc<Termination>,
    pub(crate) bus: Bus,
}

impl TreeContext {
    /// Creates the context of a new traversal root and wires its subscribers.
    ///
    /// Must be called from within a tokio runtime when `subscribers` is not empty.
    pub(crate) fn for_root(cfg: &Config, subscribers: &[Arc<dyn Subscribe>]) -> Arc<Self> {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        if !subscribers.is_empty() {
            spawn_listener(&bus, subscribers.to_vec());
        }
        Arc::new(Self {
            termination: Arc::new(Termination::new()),
            bus,
        })
    }

    pub(crate) fn publish(&self, ev: Event) {
        self.bus.publish(ev);
    }
}

/// Subscribes to the bus and forwards events to the subscriber set until the bus closes.
fn spawn_listener(bus: &Bus, subscribers: Vec<Arc<dyn Subscribe>>) {
    let mut rx = bus.subscribe();
    let set = SubscriberSet::new(subscribers);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => set.emit(&ev),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event listener lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        set.shutdown().await;
    });
}

/// Runtime record of one service instance.
pub(crate) struct Node {
    pub(crate) name: Arc<str>,
    pub(crate) component: Arc<dyn Service>,
    pub(crate) lifecycle: watch::Sender<Lifecycle>,
    pub(crate) config: Config,
    pub(crate) subscribers: Vec<Arc<dyn Subscribe>>,
    /// Set while this node holds the embedder's explicit start (cleared by `stop`).
    pub(crate) root_held: AtomicBool,
    pub(crate) tasks: TaskSet,
    tree: Mutex<Option<Arc<TreeContext>>>,
    termination: OnceLock<Arc<Termination>>,
    report: Mutex<Option<ShutdownReport>>,
}

impl Node {
    pub(crate) fn new(
        component: Arc<dyn Service>,
        config: Config,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        let name: Arc<str> = Arc::from(component.name());
        let (lifecycle, _rx) = watch::channel(Lifecycle::default());
        Self {
            name,
            component,
            lifecycle,
            config,
            subscribers,
            root_held: AtomicBool::new(false),
            tasks: TaskSet::new(),
            tree: Mutex::new(None),
            termination: OnceLock::new(),
            report: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> State {
        self.lifecycle.borrow().state
    }

    pub(crate) fn dependents(&self) -> usize {
        self.lifecycle.borrow().dependents
    }

    /// Applies a state-machine step; watchers are notified only if it changed anything.
    ///
    /// `fallback` is returned if the step was never invoked, which `send_if_modified`
    /// does not do.
    pub(crate) fn transition<R>(&self, fallback: R, step: impl FnOnce(&mut Lifecycle) -> R) -> R {
        let mut out = fallback;
        self.lifecycle.send_if_modified(|lc| {
            let before = *lc;
            out = step(lc);
            *lc != before
        });
        out
    }

    /// Waits until the node reaches `Stopped` or `Crashed`.
    pub(crate) async fn terminated(&self) -> State {
        let mut rx = self.lifecycle.subscribe();
        let _ = rx.wait_for(|lc| lc.state.is_terminal()).await;
        self.state()
    }

    pub(crate) fn attach(&self, tree: Arc<TreeContext>) {
        let _ = self.termination.set(tree.termination.clone());
        *lock(&self.tree) = Some(tree);
    }

    pub(crate) fn detach(&self) {
        lock(&self.tree).take();
    }

    pub(crate) fn tree(&self) -> Option<Arc<TreeContext>> {
        lock(&self.tree).clone()
    }

    pub(crate) fn termination(&self) -> Option<&Arc<Termination>> {
        self.termination.get()
    }

    pub(crate) fn publish(&self, kind: EventKind) {
        if let Some(tree) = self.tree() {
            tree.publish(Event::new(kind).with_service(self.name.clone()));
        }
    }

    pub(crate) fn publish_with_reason(&self, kind: EventKind, reason: impl Into<Arc<str>>) {
        if let Some(tree) = self.tree() {
            tree.publish(
                Event::new(kind)
                    .with_service(self.name.clone())
                    .with_reason(reason),
            );
        }
    }

    /// Resolves the tree's termination cell. Returns `false` if it was already resolved
    /// or the node was never started.
    pub(crate) fn request_stop(&self, outcome: Outcome) -> bool {
        let Some(termination) = self.termination() else {
            return false;
        };
        let reason = outcome.as_reason();
        let won = termination.resolve(outcome);
        if won {
            debug!(service = %self.name, reason, "stop requested");
            self.publish_with_reason(EventKind::StopRequested, reason);
        }
        won
    }

    pub(crate) fn add_task<F, Fut>(
        &self,
        name: Arc<str>,
        f: F,
    ) -> Result<TaskHandle, LifecycleError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let state = self.state();
        let not_running = || LifecycleError::NotRunning {
            service: self.name.clone(),
            state,
        };
        if !matches!(state, State::Starting | State::Running) {
            return Err(not_running());
        }
        let tree = self.tree().ok_or_else(not_running)?;
        self.tasks
            .spawn(&self.name, name, tree, f)
            .ok_or_else(not_running)
    }

    pub(crate) fn keep_report(&self, report: ShutdownReport) {
        *lock(&self.report) = Some(report);
    }

    pub(crate) fn report(&self) -> Option<ShutdownReport> {
        lock(&self.report).clone()
    }
}
