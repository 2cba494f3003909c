//! Signal-driven cancellation of the worker pool.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Turns an interrupt signal into a cancellation request for every worker.
///
/// The coordinator never stops a worker itself; it cancels the root token
/// and the pool waits for each worker to notice before returning.
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a fresh root token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Root token; hand this to [`WorkerPool::run`](crate::pool::WorkerPool::run).
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request cancellation of every worker.
    pub fn trigger(&self, signal: &str) {
        info!(signal, "Terminated by signal, waiting for workers to finish");
        self.token.cancel();
    }

    /// Listen for SIGINT and SIGTERM in the background.
    ///
    /// The first signal triggers cancellation; the listener exits after that
    /// or once the token is cancelled some other way.
    ///
    /// # Errors
    /// Returns an error if the signal handlers cannot be installed.
    #[cfg(unix)]
    pub fn listen(&self) -> std::io::Result<JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let coordinator = self.clone();

        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => coordinator.trigger("SIGINT"),
                _ = sigterm.recv() => coordinator.trigger("SIGTERM"),
                () = coordinator.token.cancelled() => {}
            }
        }))
    }

    /// Listen for Ctrl-C in the background.
    ///
    /// # Errors
    /// Never fails on this platform; the signature matches the Unix version.
    #[cfg(not(unix))]
    pub fn listen(&self) -> std::io::Result<JoinHandle<()>> {
        let coordinator = self.clone();

        Ok(tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        coordinator.trigger("Ctrl-C");
                    }
                }
                () = coordinator.token.cancelled() => {}
            }
        }))
    }
}
