//! Process shutdown: signal handling and ordered draining

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::registry::TaskRegistry;
use crate::worker::WorkerPool;

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        signal(SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Orders the teardown of the task pipeline.
///
/// [`trigger`](Self::trigger) stops new admissions and unblocks producers
/// waiting on a full queue. [`drain`](Self::drain) then lets the workers
/// finish what was already dispatched and removes the temp directory.
pub struct ShutdownCoordinator {
    registry: Arc<TaskRegistry>,
    tmp_dir: PathBuf,
}

impl ShutdownCoordinator {
    pub fn new(registry: Arc<TaskRegistry>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            tmp_dir: tmp_dir.into(),
        }
    }

    /// Idempotent.
    pub fn trigger(&self) {
        if !self.registry.queue().is_shutting_down() {
            info!(
                active = self.registry.active_count(),
                queued = self.registry.queue().pending(),
                "Stopping task admissions"
            );
        }
        self.registry.queue().close();
    }

    pub async fn drain(&self, pool: WorkerPool) {
        self.trigger();
        pool.join().await;

        match tokio::fs::remove_dir_all(&self.tmp_dir).await {
            Ok(()) => info!(dir = %self.tmp_dir.display(), "Temp directory removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(dir = %self.tmp_dir.display(), error = %err, "Failed to remove temp directory")
            }
        }

        info!(active = self.registry.active_count(), "Shutdown complete");
    }
}
