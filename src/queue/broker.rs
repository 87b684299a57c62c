use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::tasks::Task;

/// Receiving half handed to the worker pool.
pub type WorkReceiver = mpsc::Receiver<Arc<Task>>;

/// What happened to an enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The task is in the channel and will be picked up by a worker.
    Sent,
    /// Shutdown began (or the workers are gone); the task was left untouched.
    Abandoned,
}

/// Bounded hand-off between request handlers and the worker pool.
///
/// Architecture:
/// 1. A handler completes a task and calls `queue.enqueue(task)`
/// 2. The send races against the shutdown token, so a full channel never
///    blocks a handler once shutdown began
/// 3. `close()` fires the token and drops the queue's sender; the channel
///    closes as soon as in-flight sends have returned
/// 4. Workers drain whatever is already buffered, then see the channel end
///
/// Clones share the same channel and shutdown token.
#[derive(Clone)]
pub struct WorkQueue {
    sender: Arc<RwLock<Option<mpsc::Sender<Arc<Task>>>>>,
    shutdown: CancellationToken,
    capacity: usize,
}

impl WorkQueue {
    /// Create the queue and the receiver for the worker pool.
    pub fn new(capacity: usize, shutdown: CancellationToken) -> (Self, WorkReceiver) {
        info!(capacity, "Creating work queue");
        let (tx, rx) = mpsc::channel(capacity);

        let queue = Self {
            sender: Arc::new(RwLock::new(Some(tx))),
            shutdown,
            capacity,
        };

        (queue, rx)
    }

    /// Hand a task to the workers.
    ///
    /// Waits while the channel is full unless shutdown fires first. Once
    /// shutdown fired the call returns immediately with `Abandoned`.
    pub async fn enqueue(&self, task: Arc<Task>) -> EnqueueOutcome {
        let task_id = task.id();

        if self.shutdown.is_cancelled() {
            debug!(%task_id, "Shutdown in progress, enqueue abandoned");
            return EnqueueOutcome::Abandoned;
        }

        let Some(sender) = self.sender() else {
            debug!(%task_id, "Work queue closed, enqueue abandoned");
            return EnqueueOutcome::Abandoned;
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                debug!(%task_id, "Shutdown fired while waiting for queue space");
                EnqueueOutcome::Abandoned
            }
            sent = sender.send(task) => match sent {
                Ok(()) => {
                    debug!(%task_id, "Task handed to workers");
                    EnqueueOutcome::Sent
                }
                Err(_) => {
                    warn!(%task_id, "Worker channel closed, task not delivered");
                    EnqueueOutcome::Abandoned
                }
            }
        }
    }

    /// Signal shutdown and release the queue's sender.
    pub fn close(&self) {
        self.shutdown.cancel();
        let dropped = self
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if dropped.is_some() {
            info!("Work queue closed");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of tasks buffered and not yet picked up.
    pub fn pending(&self) -> usize {
        self.sender()
            .map(|sender| self.capacity - sender.capacity())
            .unwrap_or(0)
    }

    fn sender(&self) -> Option<mpsc::Sender<Arc<Task>>> {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
