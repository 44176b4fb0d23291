//! Graceful Shutdown Handler
//!
//! Broadcasts a single shutdown signal to the HTTP server and to anything
//! else that needs to stop, and bounds how long teardown may take.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Shutdown coordinator for graceful termination.
#[derive(Clone)]
pub struct ShutdownController {
    /// Whether shutdown has been initiated
    shutdown_initiated: Arc<AtomicBool>,
    /// Broadcast channel for shutdown signal
    shutdown_tx: broadcast::Sender<()>,
    /// Upper bound on each teardown step once shutdown starts
    grace: Duration,
}

impl ShutdownController {
    /// Create a new shutdown controller.
    pub fn new(grace: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            grace,
        }
    }

    /// Subscribe to shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Initiate graceful shutdown.
    pub fn shutdown(&self) {
        if !self.shutdown_initiated.swap(true, Ordering::SeqCst) {
            tracing::info!("initiating graceful shutdown");
            let _ = self.shutdown_tx.send(());
        }
    }

    /// Check if shutdown has been initiated.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Resolve once shutdown has been initiated.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        if self.is_shutdown() {
            return;
        }
        let _ = rx.recv().await;
    }

    /// Run a teardown step, giving up after the grace period.
    ///
    /// Returns false if the step did not finish in time.
    pub async fn bounded<F>(&self, what: &str, step: F) -> bool
    where
        F: Future<Output = ()>,
    {
        match tokio::time::timeout(self.grace, step).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("{} did not finish within {:?}, giving up", what, self.grace);
                false
            }
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

/// Install signal handlers for graceful shutdown.
///
/// Completes when SIGINT or SIGTERM is received, then triggers `controller`.
#[cfg_attr(coverage_nightly, coverage(off))]
pub async fn shutdown_signal(controller: ShutdownController) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received SIGINT, closing server");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, closing server");
        }
    }

    controller.shutdown();
}
