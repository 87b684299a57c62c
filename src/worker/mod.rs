//! Download worker service
//!
//! A fixed pool of workers shares the receiving end of the work queue. Each
//! worker takes one task at a time and drives it through [`TaskRunner`]:
//! concurrent downloads into a per-task temp directory, then a zip archive
//! written on the blocking pool.

pub mod archive;
pub(crate) mod filename;
pub mod http;
pub mod runner;

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub use archive::{ARCHIVE_FILE_NAME, ArchiveError, ArchiveReport, EntryError};
pub use http::{DownloadError, DownloadedFile, Fetcher, HttpClient, HttpConfig};
pub use runner::{RunnerSettings, TaskError, TaskRunner};

use crate::queue::WorkReceiver;
use crate::tasks::TaskOutcome;

/// Handle to the running workers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` loops consuming from `receiver`.
    ///
    /// Each loop ends once the queue is closed and every buffered task has
    /// been taken.
    pub fn spawn(workers: usize, receiver: WorkReceiver, runner: Arc<TaskRunner>) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers)
            .map(|worker_id| {
                let receiver = receiver.clone();
                let runner = runner.clone();
                tokio::spawn(worker_loop(worker_id, receiver, runner))
            })
            .collect();

        info!(workers, "Worker pool started");
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(error = %err, "Worker exited abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn worker_loop(worker_id: usize, receiver: Arc<Mutex<WorkReceiver>>, runner: Arc<TaskRunner>) {
    debug!(worker_id, "Worker started");

    loop {
        let next = receiver.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };

        let task_id = task.id();
        debug!(worker_id, %task_id, "Worker picked up task");

        // The pipeline runs in its own task so a panic stays contained.
        let pipeline = {
            let runner = runner.clone();
            let task = task.clone();
            tokio::spawn(async move { runner.run(task).await })
        };

        if let Err(err) = pipeline.await {
            error!(worker_id, %task_id, error = %err, "Task pipeline aborted");
            runner.discard_tmp(task_id).await;
            runner
                .registry()
                .settle(
                    &task,
                    TaskOutcome::Failed {
                        reason: format!("internal error: {err}"),
                    },
                )
                .await;
        }
    }

    debug!(worker_id, "Worker stopped, queue closed");
}
