//! # OS interrupts as stop requests.
//!
//! [`ServiceHandle::run`](crate::ServiceHandle::run) races the termination cell of its tree
//! against [`interrupted`] when [`Config::handle_os_signals`](crate::Config::handle_os_signals)
//! is set. A received signal is delivered as cancellation: the tree stops through the same
//! reverse traversal as an explicit stop request.
//!
//! **Unix:** `SIGINT`, `SIGTERM`, `SIGQUIT`. **Elsewhere:** Ctrl-C.

use tracing::warn;

/// Completes when the process receives a termination signal.
///
/// Returns `Err` if signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Completes when the process receives a termination signal.
///
/// Returns `Err` if signal registration fails.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Completes on an OS interrupt; never completes when disabled or when listeners cannot
/// be registered.
pub(crate) async fn interrupted(enabled: bool, service: &str) {
    if enabled {
        match wait_for_shutdown_signal().await {
            Ok(()) => return,
            Err(err) => warn!(service, %err, "signal listeners unavailable; interrupts ignored"),
        }
    }
    std::future::pending::<()>().await
}
