//! # Blocking variant.
//!
//! The same lifecycle as the async runtime, executed entirely on the calling thread:
//!
//! - the state machine and [`DependencyGroup`](crate::DependencyGroup) are shared with the
//!   async runtime;
//! - concurrent groups degrade to sequential visits in array order;
//! - there are no background tasks, no termination wait and no shutdown budget.
//!
//! ```
//! use stackvisor::blocking::{BlockingGroup, BlockingHandle, BlockingService};
//!
//! struct Db;
//! impl BlockingService for Db {}
//!
//! struct App(BlockingHandle);
//! impl BlockingService for App {
//!     fn dependencies(&self) -> Vec<BlockingGroup> {
//!         vec![self.0.clone().into()]
//!     }
//! }
//!
//! let db = BlockingHandle::new(Db);
//! let app = BlockingHandle::new(App(db.clone()));
//! app.scope(|_| Ok(())).unwrap();
//! assert!(!db.running());
//! ```

mod service;
mod walker;

pub use service::{BlockingGroup, BlockingHandle, BlockingService};
