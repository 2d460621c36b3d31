//! # Event subscribers for the stackvisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and the
//! optional built-in [`LogWriter`] (feature `logging`).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   walker / tasks ── publish(Event) ──► Bus ──► tree listener ──► SubscriberSet
//!                                                                     │
//!                                                          ┌──────────┼──────────┐
//!                                                          ▼          ▼          ▼
//!                                                      LogWriter   Metrics    Custom
//! ```
//!
//! Subscribers are attached to the root of a tree through
//! [`ServiceBuilder::with_subscribers`](crate::ServiceBuilder::with_subscribers) and observe
//! every node started under that root.

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
