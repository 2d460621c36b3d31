//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to publish lifecycle
//! events emitted by the tree walker, the task supervisor and the shutdown coordinator.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
