//! Error types used by the stackvisor runtime and background tasks.
//!
//! This module defines two main error enums:
//!
//! - [`LifecycleError`] - errors raised while starting, running or stopping a service tree.
//! - [`TaskError`] - errors raised by individual background tasks.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.
//!
//! ## Suppressed errors
//! A stop traversal never short-circuits: every node is attempted, and only the first
//! error is surfaced. Later errors ride along as *suppressed* detail inside
//! [`LifecycleError::Suppressed`], so an original start or crash cause is never masked
//! by secondary stop failures.

use std::sync::Arc;

use thiserror::Error;

use crate::lifecycle::State;

/// Shared, cloneable cause of a component failure.
pub type Cause = Arc<anyhow::Error>;

/// # Errors produced by the stackvisor runtime.
///
/// These errors are `Clone`: the same cause is delivered to every caller waiting on the
/// termination of a service.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum LifecycleError {
    /// The service's own `start` body returned an error.
    #[error("service `{service}` failed to start: {cause:#}")]
    StartFailed {
        /// Name of the failing service.
        service: Arc<str>,
        /// Error returned by the component.
        cause: Cause,
    },

    /// A background task of a running service failed.
    #[error("service `{service}` crashed: task `{task}` failed: {error}")]
    Crashed {
        /// Name of the service owning the task.
        service: Arc<str>,
        /// Name of the failed task.
        task: Arc<str>,
        /// Error reported by the task.
        error: TaskError,
    },

    /// The service's own `stop` body returned an error.
    #[error("service `{service}` failed to stop: {cause:#}")]
    StopFailed {
        /// Name of the failing service.
        service: Arc<str>,
        /// Error returned by the component.
        cause: Cause,
    },

    /// The body of a scoped acquisition returned an error.
    #[error("scope over `{service}` failed: {cause:#}")]
    ScopeFailed {
        /// Name of the scoped service.
        service: Arc<str>,
        /// Error returned by the scope body.
        cause: Cause,
    },

    /// `start` was called on a service that is not idle.
    #[error("service `{service}` already started (state: {state})")]
    AlreadyStarted {
        /// Name of the service.
        service: Arc<str>,
        /// State observed at the time of the call.
        state: State,
    },

    /// `wait`, `stop` or `add_task` was called on a service that is not running.
    #[error("service `{service}` is not running (state: {state})")]
    NotRunning {
        /// Name of the service.
        service: Arc<str>,
        /// State observed at the time of the call.
        state: State,
    },

    /// A dependency could not be acquired because it is stopping or terminal.
    #[error("dependency `{service}` is unavailable (state: {state})")]
    DependencyUnavailable {
        /// Name of the dependency.
        service: Arc<str>,
        /// State observed at the time of acquisition.
        state: State,
    },

    /// The start of a service was aborted because its tree was asked to terminate.
    #[error("start of `{service}` cancelled")]
    Cancelled {
        /// Name of the service whose start was aborted.
        service: Arc<str>,
    },

    /// The run was ended by an OS termination signal.
    #[error("interrupted by shutdown signal")]
    Interrupted,

    /// A primary error together with secondary errors that must not mask it.
    #[error("{primary} (+{} suppressed)", .suppressed.len())]
    Suppressed {
        /// The error surfaced to the caller.
        primary: Box<LifecycleError>,
        /// Secondary errors collected afterwards.
        suppressed: Vec<LifecycleError>,
    },
}

impl LifecycleError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use stackvisor::LifecycleError;
    ///
    /// assert_eq!(LifecycleError::Interrupted.as_label(), "interrupted");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleError::StartFailed { .. } => "start_failed",
            LifecycleError::Crashed { .. } => "crashed",
            LifecycleError::StopFailed { .. } => "stop_failed",
            LifecycleError::ScopeFailed { .. } => "scope_failed",
            LifecycleError::AlreadyStarted { .. } => "already_started",
            LifecycleError::NotRunning { .. } => "not_running",
            LifecycleError::DependencyUnavailable { .. } => "dependency_unavailable",
            LifecycleError::Cancelled { .. } => "cancelled",
            LifecycleError::Interrupted => "interrupted",
            LifecycleError::Suppressed { primary, .. } => primary.as_label(),
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        format!("{self}")
    }

    /// Returns the error surfaced to the caller, looking through [`LifecycleError::Suppressed`].
    pub fn primary(&self) -> &LifecycleError {
        match self {
            LifecycleError::Suppressed { primary, .. } => primary.primary(),
            other => other,
        }
    }

    /// Returns the secondary errors attached to this error (empty if none).
    pub fn suppressed(&self) -> &[LifecycleError] {
        match self {
            LifecycleError::Suppressed { suppressed, .. } => suppressed,
            _ => &[],
        }
    }

    /// Returns the component error behind a start, stop or scope failure.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self.primary() {
            LifecycleError::StartFailed { cause, .. }
            | LifecycleError::StopFailed { cause, .. }
            | LifecycleError::ScopeFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// Attaches `others` as suppressed detail, keeping `self` as the primary error.
    ///
    /// Nested suppressed lists are flattened.
    pub fn with_suppressed(self, others: impl IntoIterator<Item = LifecycleError>) -> Self {
        let (primary, mut suppressed) = match self {
            LifecycleError::Suppressed {
                primary,
                suppressed,
            } => (primary, suppressed),
            other => (Box::new(other), Vec::new()),
        };
        for err in others {
            match err {
                LifecycleError::Suppressed {
                    primary: inner,
                    suppressed: rest,
                } => {
                    suppressed.push(*inner);
                    suppressed.extend(rest);
                }
                other => suppressed.push(other),
            }
        }
        if suppressed.is_empty() {
            *primary
        } else {
            LifecycleError::Suppressed {
                primary,
                suppressed,
            }
        }
    }

    pub(crate) fn start_failed(service: &Arc<str>, cause: anyhow::Error) -> Self {
        LifecycleError::StartFailed {
            service: service.clone(),
            cause: Arc::new(cause),
        }
    }

    pub(crate) fn stop_failed(service: &Arc<str>, cause: anyhow::Error) -> Self {
        LifecycleError::StopFailed {
            service: service.clone(),
            cause: Arc::new(cause),
        }
    }
}

/// Keeps the first result's error as primary and attaches the second's as suppressed.
pub(crate) fn merge(
    primary: Result<(), LifecycleError>,
    secondary: Result<(), LifecycleError>,
) -> Result<(), LifecycleError> {
    match (primary, secondary) {
        (Err(first), Err(second)) => Err(first.with_suppressed([second])),
        (Err(first), Ok(())) => Err(first),
        (Ok(()), other) => other,
    }
}

/// # Errors produced by background tasks.
///
/// Any variant other than [`TaskError::Canceled`] escaping a task while its service is
/// running crashes the whole stack.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// Task execution failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error; reported the same way as [`TaskError::Fail`].
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Task panicked.
    #[error("panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// Task observed cancellation and exited; never treated as a crash.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use stackvisor::TaskError;
    ///
    /// let err = TaskError::Fail { error: "boom".into() };
    /// assert_eq!(err.as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Fail { error } => format!("error: {error}"),
            TaskError::Fatal { error } => format!("fatal: {error}"),
            TaskError::Panicked { info } => format!("panic: {info}"),
            TaskError::Canceled => "context cancelled".to_string(),
        }
    }

    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        TaskError::Fail {
            error: format!("{err:#}"),
        }
    }
}
