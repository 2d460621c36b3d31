//! # Per-service lifecycle state machine.
//!
//! Shared by the async and blocking runtimes. The machine is pure: it only decides the
//! next state, callers apply it under whatever cell they keep it in (`watch` channel for
//! the async runtime, `Mutex` for the blocking one).
//!
//! ## States
//! ```text
//! Idle ──► Starting ──► Running ──► Stopping ──► Stopped
//!              │                        ▲    └──► Crashed
//!              └── start failed ─────────┘
//! ```
//!
//! ## Rules
//! - Instances are single-use: nothing leaves `Stopped`/`Crashed`.
//! - A running service is shared by reference count. Every acquisition increments
//!   `dependents`, every release decrements it, and only the last release stops it.
//! - Acquiring a service that is `Starting` never starts it twice; the caller waits for the
//!   in-flight start to settle and acquires again.

use std::fmt;

/// Observable state of one service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Constructed, never started.
    Idle,
    /// Dependencies and the service's own start body are executing.
    Starting,
    /// Started; background tasks may be scheduled.
    Running,
    /// Stop (or start rollback) traversal in progress.
    Stopping,
    /// Terminated cleanly, or rolled back after a failed start.
    Stopped,
    /// Terminated because an unhandled error ended the run.
    Crashed,
}

impl State {
    /// True for `Stopped` and `Crashed`.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Stopped | State::Crashed)
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Starting => "starting",
            State::Running => "running",
            State::Stopping => "stopping",
            State::Stopped => "stopped",
            State::Crashed => "crashed",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Decision taken when a traversal tries to acquire a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acquire {
    /// The caller owns the start and must run it.
    Start,
    /// Already running; the caller now shares it.
    Shared,
    /// A start is in flight elsewhere; wait for it to settle, then retry.
    Wait,
    /// Stopping or terminal; cannot be acquired.
    Rejected(State),
}

/// Decision taken when a traversal releases a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    /// Last dependent gone; the caller owns the stop and must run it.
    Stop,
    /// Other dependents remain.
    Shared,
    /// Not running; nothing to release.
    Ignored(State),
}

/// State plus the number of traversals currently sharing the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Lifecycle {
    pub(crate) state: State,
    pub(crate) dependents: usize,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: State::Idle,
            dependents: 0,
        }
    }
}

impl Lifecycle {
    /// Explicit start by an embedder: only `Idle` is accepted.
    pub(crate) fn begin(&mut self) -> Result<(), State> {
        match self.state {
            State::Idle => {
                self.state = State::Starting;
                self.dependents = 1;
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Acquisition by a parent traversal.
    pub(crate) fn acquire(&mut self) -> Acquire {
        match self.state {
            State::Idle => {
                self.state = State::Starting;
                self.dependents = 1;
                Acquire::Start
            }
            State::Starting => Acquire::Wait,
            State::Running => {
                self.dependents += 1;
                Acquire::Shared
            }
            other => Acquire::Rejected(other),
        }
    }

    /// `Starting → Running`.
    pub(crate) fn started(&mut self) -> bool {
        if self.state == State::Starting {
            self.state = State::Running;
            true
        } else {
            false
        }
    }

    /// `Starting → Stopping`: rollback after a failed start. Waiting acquirers are rejected.
    pub(crate) fn abort_start(&mut self) -> bool {
        if self.state == State::Starting {
            self.state = State::Stopping;
            self.dependents = 0;
            true
        } else {
            false
        }
    }

    /// Drops one dependent; the last one moves `Running → Stopping`.
    pub(crate) fn release(&mut self) -> Release {
        match self.state {
            State::Running => {
                self.dependents = self.dependents.saturating_sub(1);
                if self.dependents == 0 {
                    self.state = State::Stopping;
                    Release::Stop
                } else {
                    Release::Shared
                }
            }
            other => Release::Ignored(other),
        }
    }

    /// `Stopping → Stopped | Crashed`.
    pub(crate) fn finish(&mut self, crashed: bool) -> bool {
        if self.state == State::Stopping {
            self.state = if crashed {
                State::Crashed
            } else {
                State::Stopped
            };
            true
        } else {
            false
        }
    }
}
