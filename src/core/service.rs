//! # Service capability contract.
//!
//! A component implements [`Service`]; the runtime wraps it in a
//! [`ServiceHandle`](crate::ServiceHandle) that owns its lifecycle.
//!
//! | Method                      | Read / called                          | Default |
//! |-----------------------------|----------------------------------------|---------|
//! | `name`                      | once, when the handle is built         | type name |
//! | `dependencies`              | at the entry of every start/stop walk  | none |
//! | `graceful_shutdown_timeout` | when the service begins stopping       | 10s |
//! | `start`                     | once, after every dependency started   | no-op |
//! | `stop`                      | once, after background tasks drained   | no-op |
//!
//! `dependencies` must return the same topology for one full start/stop cycle.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::config::DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT;
use crate::core::handle::ServiceHandle;
use crate::core::node::Node;
use crate::core::tasks::TaskHandle;
use crate::core::termination::Outcome;
use crate::error::{LifecycleError, TaskError};
use crate::lifecycle::State;
use crate::tree::DependencyGroup;

/// Dependency group of async services.
pub type Group = DependencyGroup<ServiceHandle>;

impl From<ServiceHandle> for Group {
    fn from(handle: ServiceHandle) -> Self {
        DependencyGroup::Single(handle)
    }
}

impl From<&ServiceHandle> for Group {
    fn from(handle: &ServiceHandle) -> Self {
        DependencyGroup::Single(handle.clone())
    }
}

impl From<Vec<ServiceHandle>> for Group {
    fn from(handles: Vec<ServiceHandle>) -> Self {
        DependencyGroup::Concurrent(handles)
    }
}

/// # A component with an explicit start/stop lifecycle.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use stackvisor::{Group, Service, ServiceContext, ServiceHandle};
///
/// struct Api {
///     db: ServiceHandle,
/// }
///
/// #[async_trait]
/// impl Service for Api {
///     fn name(&self) -> &str {
///         "api"
///     }
///
///     fn dependencies(&self) -> Vec<Group> {
///         vec![self.db.clone().into()]
///     }
///
///     async fn start(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Name used in logs, events and errors.
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Ordered dependency groups; see [`DependencyGroup`].
    fn dependencies(&self) -> Vec<Group> {
        Vec::new()
    }

    /// Budget for this service's own stop work.
    ///
    /// On the root of a stop traversal this is also the budget of the whole tree.
    fn graceful_shutdown_timeout(&self) -> Duration {
        DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT
    }

    /// Own start body. Runs after every dependency is running.
    ///
    /// An error aborts the start and rolls back the dependencies started so far.
    async fn start(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Own stop body. Runs after every background task of this service has finished and
    /// before any dependency stops.
    ///
    /// An error is collected; the traversal continues.
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Back-reference to the running service, handed to [`Service::start`].
///
/// It may be stored by the component; it does not keep the service alive.
#[derive(Clone, Debug)]
pub struct ServiceContext {
    node: Weak<Node>,
    name: Arc<str>,
}

impl ServiceContext {
    pub(crate) fn new(node: &Arc<Node>) -> Self {
        Self {
            node: Arc::downgrade(node),
            name: node.name.clone(),
        }
    }

    /// Name of the owning service.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schedules a supervised background task.
    ///
    /// `f` receives a [`CancellationToken`] cancelled when the service begins stopping.
    /// An error or panic escaping the task while the service runs crashes the stack.
    ///
    /// Fails with [`LifecycleError::NotRunning`] unless the service is starting or running.
    pub fn add_task<F, Fut>(
        &self,
        name: impl Into<Arc<str>>,
        f: F,
    ) -> Result<TaskHandle, LifecycleError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        match self.node.upgrade() {
            Some(node) => node.add_task(name.into(), f),
            None => Err(LifecycleError::NotRunning {
                service: self.name.clone(),
                state: State::Stopped,
            }),
        }
    }

    /// Asks the whole tree to stop cleanly. Returns `false` if termination was already
    /// decided.
    pub fn request_stop(&self) -> bool {
        self.node
            .upgrade()
            .is_some_and(|node| node.request_stop(Outcome::Stopped))
    }

    /// True once the tree this service runs in has been asked to terminate.
    pub fn stop_requested(&self) -> bool {
        self.node
            .upgrade()
            .and_then(|node| node.termination().map(|t| t.is_resolved()))
            .unwrap_or(true)
    }
}
