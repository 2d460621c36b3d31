use std::sync::Arc;

use crate::core::config::Config;
use crate::core::handle::ServiceHandle;
use crate::core::node::Node;
use crate::core::service::Service;
use crate::subscribers::Subscribe;

/// Builder for a [`ServiceHandle`] with non-default runtime settings.
///
/// Configuration and subscribers only take effect when the built service is the root of a
/// traversal (`start`, `run` or `scope` called on it); as a dependency it joins the tree
/// of whoever started it.
pub struct ServiceBuilder {
    component: Arc<dyn Service>,
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ServiceBuilder {
    /// Creates a builder for `service` with the default configuration.
    pub fn new<S: Service>(service: S) -> Self {
        Self::from_arc(Arc::new(service))
    }

    /// Creates a builder for an already shared component.
    pub fn from_arc(component: Arc<dyn Service>) -> Self {
        Self {
            component,
            cfg: Config::default(),
            subscribers: Vec::new(),
        }
    }

    /// Replaces the runtime configuration.
    pub fn with_config(mut self, cfg: Config) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive the lifecycle events of the whole tree through dedicated
    /// workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one subscriber.
    pub fn with_subscriber(mut self, subscriber: impl Subscribe) -> Self {
        self.subscribers.push(Arc::new(subscriber));
        self
    }

    /// Builds the handle. Nothing runs until it is started.
    pub fn build(self) -> ServiceHandle {
        ServiceHandle::from_node(Arc::new(Node::new(
            self.component,
            self.cfg,
            self.subscribers,
        )))
    }
}
