//! In-process counters exposed on the health endpoint

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    tasks_created: AtomicU64,
    tasks_rejected: AtomicU64,
    tasks_dispatched: AtomicU64,
    tasks_ready: AtomicU64,
    tasks_failed: AtomicU64,
    files_downloaded: AtomicU64,
    files_failed: AtomicU64,
    enqueue_abandoned: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_created(&self) {
        incr(&self.tasks_created, "tasks_created");
    }

    pub fn task_rejected(&self) {
        incr(&self.tasks_rejected, "tasks_rejected");
    }

    pub fn task_dispatched(&self) {
        incr(&self.tasks_dispatched, "tasks_dispatched");
    }

    pub fn task_ready(&self) {
        incr(&self.tasks_ready, "tasks_ready");
    }

    pub fn task_failed(&self) {
        incr(&self.tasks_failed, "tasks_failed");
    }

    pub fn file_downloaded(&self) {
        incr(&self.files_downloaded, "files_downloaded");
    }

    pub fn file_failed(&self) {
        incr(&self.files_failed, "files_failed");
    }

    pub fn enqueue_abandoned(&self) {
        incr(&self.enqueue_abandoned, "enqueue_abandoned");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_created: self.tasks_created.load(Ordering::Relaxed),
            tasks_rejected: self.tasks_rejected.load(Ordering::Relaxed),
            tasks_dispatched: self.tasks_dispatched.load(Ordering::Relaxed),
            tasks_ready: self.tasks_ready.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            files_downloaded: self.files_downloaded.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            enqueue_abandoned: self.enqueue_abandoned.load(Ordering::Relaxed),
        }
    }
}

fn incr(counter: &AtomicU64, name: &'static str) {
    counter.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(counter = name, "Metric incremented");
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub tasks_created: u64,
    pub tasks_rejected: u64,
    pub tasks_dispatched: u64,
    pub tasks_ready: u64,
    pub tasks_failed: u64,
    pub files_downloaded: u64,
    pub files_failed: u64,
    pub enqueue_abandoned: u64,
}
