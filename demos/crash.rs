//! # Example: crash
//!
//! A background task fails and takes the whole stack down.
//!
//! Shows how to:
//! - Spawn a supervised task from a start body.
//! - Observe the crash with a custom [`Subscribe`] implementation.
//! - Read the error returned by [`ServiceHandle::run`].
//!
//! ## Flow
//! ```text
//! worker.task("poll") ──► Err ──► termination cell = Failed(Crashed)
//!     └─► stop tree: worker (Crashed) ──► queue (Stopped)
//!           └─► run() returns Err(Crashed)
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example crash
//! ```

use std::time::Duration;

use async_trait::async_trait;
use stackvisor::{
    Event, EventKind, Group, LifecycleError, Service, ServiceContext, ServiceHandle, Subscribe,
    TaskError,
};

struct Queue;

#[async_trait]
impl Service for Queue {
    fn name(&self) -> &str {
        "queue"
    }

    async fn stop(&self) -> anyhow::Result<()> {
        println!("queue: closed");
        Ok(())
    }
}

struct Worker {
    queue: ServiceHandle,
}

#[async_trait]
impl Service for Worker {
    fn name(&self) -> &str {
        "worker"
    }

    fn dependencies(&self) -> Vec<Group> {
        vec![self.queue.clone().into()]
    }

    async fn start(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        ctx.add_task("poll", |token| async move {
            for attempt in 1..=3 {
                tokio::select! {
                    _ = token.cancelled() => return Err(TaskError::Canceled),
                    _ = tokio::time::sleep(Duration::from_millis(200)) => {
                        println!("worker: poll #{attempt}");
                    }
                }
            }
            Err(TaskError::Fail {
                error: "queue returned garbage".into(),
            })
        })?;
        Ok(())
    }
}

/// Prints only the events that matter for a post-mortem.
struct PostMortem;

#[async_trait]
impl Subscribe for PostMortem {
    async fn on_event(&self, ev: &Event) {
        match ev.kind {
            EventKind::TaskFailed | EventKind::ServiceCrashed => {
                println!(
                    "[sub] {:?}: service={} reason={}",
                    ev.kind,
                    ev.service.as_deref().unwrap_or("<unknown>"),
                    ev.reason.as_deref().unwrap_or("<none>")
                );
            }
            EventKind::ServiceStopped => {
                println!(
                    "[sub] stopped: service={}",
                    ev.service.as_deref().unwrap_or("<unknown>")
                );
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "post-mortem"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let queue = ServiceHandle::new(Queue);
    let worker = ServiceHandle::builder(Worker {
        queue: queue.clone(),
    })
    .with_subscriber(PostMortem)
    .build();

    match worker.run().await {
        Err(err) if matches!(err.primary(), LifecycleError::Crashed { .. }) => {
            println!("run failed as expected: {err}");
        }
        Err(err) => println!("unexpected error: {err}"),
        Ok(()) => println!("run ended cleanly?"),
    }

    // Let the subscriber worker flush.
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("worker: {}, queue: {}", worker.state(), queue.state());
}
