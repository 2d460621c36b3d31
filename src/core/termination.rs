//! # Termination cell: resolved exactly once per tree.
//!
//! The root of a traversal creates one [`Termination`]; every dependency it starts shares
//! it. Whoever resolves it first decides the [`Outcome`]:
//!
//! ```text
//! request_stop() ──┐
//! task crash     ──┼──► resolve(outcome) ──► first write wins ──► waiters wake
//! OS interrupt   ──┘
//! ```
//!
//! The value lives in a `OnceLock`, so "resolve twice" is structurally impossible; the
//! `CancellationToken` is only the wake-up edge and is cancelled after the write.

use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

use crate::error::LifecycleError;

/// Why a service tree stopped running.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Stop was requested (explicitly or by a scope exit).
    Stopped,
    /// An OS termination signal was received.
    Interrupted,
    /// An unhandled error ended the run.
    Failed(LifecycleError),
}

impl Outcome {
    /// True for [`Outcome::Failed`].
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// Converts the outcome into the result re-raised to waiters.
    pub fn into_result(self) -> Result<(), LifecycleError> {
        match self {
            Outcome::Stopped => Ok(()),
            Outcome::Interrupted => Err(LifecycleError::Interrupted),
            Outcome::Failed(err) => Err(err),
        }
    }

    pub(crate) fn as_reason(&self) -> &'static str {
        match self {
            Outcome::Stopped => "requested",
            Outcome::Interrupted => "interrupted",
            Outcome::Failed(_) => "crashed",
        }
    }
}

/// Write-once, multi-read termination signal.
#[derive(Debug, Default)]
pub(crate) struct Termination {
    outcome: OnceLock<Outcome>,
    resolved: CancellationToken,
}

impl Termination {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Resolves the cell. Returns `false` if it was already resolved (the value is kept).
    pub(crate) fn resolve(&self, outcome: Outcome) -> bool {
        let won = self.outcome.set(outcome).is_ok();
        self.resolved.cancel();
        won
    }

    pub(crate) fn get(&self) -> Option<&Outcome> {
        self.outcome.get()
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// Completes when the cell is resolved.
    pub(crate) async fn resolved(&self) {
        self.resolved.cancelled().await
    }

    /// Waits for the cell and returns a copy of its outcome.
    pub(crate) async fn wait(&self) -> Outcome {
        self.resolved().await;
        self.outcome.get().cloned().unwrap_or(Outcome::Stopped)
    }
}
