//! # Example: diamond
//!
//! A small stack where two services share one dependency.
//!
//! Shows how to:
//! - Declare ordered and concurrent [`Group`]s.
//! - Attach the built-in [`LogWriter`] subscriber to the root.
//! - Stop the whole stack from inside a background task.
//!
//! ## Flow
//! ```text
//!            api
//!          ┌─┴──┐
//!       cache  search      (concurrent group)
//!          └─┬──┘
//!            db            (started once, stopped last)
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example diamond --features logging
//! ```

use std::time::Duration;

use async_trait::async_trait;
use stackvisor::{Group, LogWriter, Service, ServiceContext, ServiceHandle, TaskError};
use tracing_subscriber::EnvFilter;

struct Db;

#[async_trait]
impl Service for Db {
    fn name(&self) -> &str {
        "db"
    }

    async fn start(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        println!("db: connected");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        println!("db: disconnected");
        Ok(())
    }
}

/// Leaf that depends on the database.
struct Reader {
    name: &'static str,
    db: ServiceHandle,
}

#[async_trait]
impl Service for Reader {
    fn name(&self) -> &str {
        self.name
    }

    fn dependencies(&self) -> Vec<Group> {
        vec![self.db.clone().into()]
    }

    async fn start(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        let name = self.name;
        ctx.add_task("warmup", move |token| async move {
            tokio::select! {
                _ = token.cancelled() => Err(TaskError::Canceled),
                _ = tokio::time::sleep(Duration::from_millis(300)) => {
                    println!("{name}: warm");
                    Ok(())
                }
            }
        })?;
        Ok(())
    }
}

struct Api {
    readers: Vec<ServiceHandle>,
}

#[async_trait]
impl Service for Api {
    fn name(&self) -> &str {
        "api"
    }

    fn dependencies(&self) -> Vec<Group> {
        vec![self.readers.clone().into()]
    }

    fn graceful_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(2)
    }

    async fn start(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        let stopper = ctx.clone();
        ctx.add_task("serve", move |token| async move {
            let mut ticks = tokio::time::interval(Duration::from_millis(250));
            for n in 0..4 {
                tokio::select! {
                    _ = token.cancelled() => return Err(TaskError::Canceled),
                    _ = ticks.tick() => println!("api: request #{n}"),
                }
            }
            stopper.request_stop();
            Ok(())
        })?;
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        println!("api: draining");
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let db = ServiceHandle::new(Db);
    let cache = ServiceHandle::new(Reader {
        name: "cache",
        db: db.clone(),
    });
    let search = ServiceHandle::new(Reader {
        name: "search",
        db: db.clone(),
    });
    let api = ServiceHandle::builder(Api {
        readers: vec![cache.clone(), search.clone()],
    })
    .with_subscriber(LogWriter::new())
    .build();

    api.run().await?;

    if let Some(report) = api.shutdown_report() {
        println!(
            "stopped in {:?} (budget {:?}, timed out: {:?})",
            report.elapsed,
            report.budget,
            report.timed_out_services()
        );
    }
    println!("db: {}, cache: {}, search: {}", db.state(), cache.state(), search.state());
    Ok(())
}
