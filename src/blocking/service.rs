use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::blocking::walker;
use crate::core::lock;
use crate::error::LifecycleError;
use crate::lifecycle::{Lifecycle, State};
use crate::tree::DependencyGroup;

/// Dependency group of blocking services. Concurrent groups run in array order.
pub type BlockingGroup = DependencyGroup<BlockingHandle>;

impl From<BlockingHandle> for BlockingGroup {
    fn from(handle: BlockingHandle) -> Self {
        DependencyGroup::Single(handle)
    }
}

impl From<&BlockingHandle> for BlockingGroup {
    fn from(handle: &BlockingHandle) -> Self {
        DependencyGroup::Single(handle.clone())
    }
}

impl From<Vec<BlockingHandle>> for BlockingGroup {
    fn from(handles: Vec<BlockingHandle>) -> Self {
        DependencyGroup::Concurrent(handles)
    }
}

/// A component with a synchronous start/stop lifecycle.
pub trait BlockingService: Send + Sync + 'static {
    /// Name used in logs and errors.
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Ordered dependency groups.
    fn dependencies(&self) -> Vec<BlockingGroup> {
        Vec::new()
    }

    /// Own start body. Runs after every dependency is running.
    fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Own stop body. Runs before any dependency stops.
    fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub(crate) struct BlockingNode {
    pub(crate) name: Arc<str>,
    pub(crate) component: Arc<dyn BlockingService>,
    lifecycle: Mutex<Lifecycle>,
    root_held: AtomicBool,
}

impl BlockingNode {
    pub(crate) fn transition<R>(&self, step: impl FnOnce(&mut Lifecycle) -> R) -> R {
        step(&mut lock(&self.lifecycle))
    }

    pub(crate) fn state(&self) -> State {
        lock(&self.lifecycle).state
    }
}

/// Shared handle owning the lifecycle of one blocking component instance.
#[derive(Clone)]
pub struct BlockingHandle {
    node: Arc<BlockingNode>,
}

impl BlockingHandle {
    /// Wraps `service`.
    pub fn new<S: BlockingService>(service: S) -> Self {
        Self::from_arc(Arc::new(service))
    }

    /// Wraps an already shared component.
    pub fn from_arc(component: Arc<dyn BlockingService>) -> Self {
        let name = Arc::from(component.name());
        Self {
            node: Arc::new(BlockingNode {
                name,
                component,
                lifecycle: Mutex::new(Lifecycle::default()),
                root_held: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn node(&self) -> &Arc<BlockingNode> {
        &self.node
    }

    /// Name reported by [`BlockingService::name`].
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

    /// True if both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &BlockingHandle) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// Starts the dependency tree, then the service itself, on the calling thread.
    ///
    /// # Errors
    /// - [`LifecycleError::AlreadyStarted`] if the instance is not idle;
    /// - the first start failure, after every dependency started by this call was
    ///   stopped again.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let node = &self.node;
        node.transition(Lifecycle::begin)
            .map_err(|state| LifecycleError::AlreadyStarted {
                service: node.name.clone(),
                state,
            })?;
        node.root_held.store(true, Ordering::Release);

        let res = walker::start(node);
        if res.is_err() {
            node.root_held.store(false, Ordering::Release);
        }
        res
    }

    /// Stops the service, then its dependency tree in reverse order.
    ///
    /// # Errors
    /// - [`LifecycleError::NotRunning`] if this handle holds no start (never started, or
    ///   already stopped);
    /// - the first stop failure, with later ones attached as suppressed.
    pub fn stop(&self) -> Result<(), LifecycleError> {
        if !self.node.root_held.swap(false, Ordering::AcqRel) {
            return Err(LifecycleError::NotRunning {
                service: self.node.name.clone(),
                state: self.state(),
            });
        }
        walker::release(&self.node)
    }

    /// Starts the tree, runs `body`, and stops the tree whatever `body` returned.
    ///
    /// # Errors
    /// - any error of [`BlockingHandle::start`] (`body` never runs);
    /// - [`LifecycleError::ScopeFailed`] if `body` fails, with stop failures attached;
    /// - stop failures otherwise.
    pub fn scope<T>(
        &self,
        body: impl FnOnce(&BlockingHandle) -> anyhow::Result<T>,
    ) -> Result<T, LifecycleError> {
        self.start()?;
        let res = body(self);
        let stopped = self.stop();
        match res {
            Ok(value) => stopped.map(|()| value),
            Err(cause) => Err(LifecycleError::ScopeFailed {
                service: self.node.name.clone(),
                cause: Arc::new(cause),
            }
            .with_suppressed(stopped.err())),
        }
    }
}

impl fmt::Debug for BlockingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingHandle")
            .field("name", &self.node.name)
            .field("state", &self.state())
            .finish()
    }
}
