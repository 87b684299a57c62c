use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::observability::Metrics;
use crate::queue::{EnqueueOutcome, WorkQueue};
use crate::tasks::{
    AttachOutcome, LinkPolicy, Task, TaskId, TaskOutcome, TaskSnapshot, archive_file_name,
};

use super::error::{RegistryError, Result};

/// In-memory task registry with admission control
///
/// The map lock only guards membership; each task carries its own lock for
/// its fields. `active` counts admitted tasks that have not reached a
/// terminal status and is the single counter used both for the admission
/// check and for the release on completion.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Arc<Task>>>,
    active: AtomicUsize,
    capacity: usize,
    policy: LinkPolicy,
    queue: WorkQueue,
    metrics: Arc<Metrics>,
}

impl TaskRegistry {
    pub fn new(capacity: usize, policy: LinkPolicy, queue: WorkQueue, metrics: Arc<Metrics>) -> Self {
        info!(
            capacity,
            files_per_task = policy.files_per_task(),
            "Creating task registry"
        );

        Self {
            tasks: RwLock::new(HashMap::new()),
            active: AtomicUsize::new(0),
            capacity,
            policy,
            queue,
            metrics,
        }
    }

    /// Admit and register a new pending task.
    ///
    /// The capacity check and the increment are one compare-and-swap, so
    /// concurrent callers can never push `active` past `capacity`.
    pub async fn create_task(&self) -> Result<Arc<Task>> {
        if self.queue.is_shutting_down() {
            return Err(RegistryError::ShuttingDown);
        }

        let capacity = self.capacity;
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < capacity).then_some(active + 1)
            })
            .map_err(|_| {
                self.metrics.task_rejected();
                RegistryError::Busy(capacity)
            })?;

        let task = Arc::new(Task::new());
        self.tasks.write().await.insert(task.id(), task.clone());
        self.metrics.task_created();

        info!(task_id = %task.id(), active = self.active_count(), "Task created");
        Ok(task)
    }

    pub async fn lookup(&self, id: TaskId) -> Result<Arc<Task>> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Lookup by the raw identifier received from a client.
    pub async fn lookup_str(&self, raw_id: &str) -> Result<Arc<Task>> {
        let id = raw_id
            .parse::<TaskId>()
            .map_err(|_| RegistryError::NotFound(raw_id.to_string()))?;
        self.lookup(id).await
    }

    /// Attach a link; the attachment that completes the task enqueues it.
    pub async fn attach_link(&self, raw_id: &str, url: &str) -> Result<AttachOutcome> {
        let task = self.lookup_str(raw_id).await?;
        let outcome = task.attach(url, &self.policy).await?;

        debug!(task_id = %task.id(), ?outcome, "Link attached");

        if outcome == AttachOutcome::Dispatch {
            self.enqueue(task).await;
        }

        Ok(outcome)
    }

    /// Hand a completed task to the workers. An abandoned send is not an
    /// error: shutdown already means the task will not be processed.
    ///
    /// The send runs on its own tokio task. The task is already marked
    /// dispatched, so a caller dropped while the queue is full must not take
    /// the send down with it.
    pub async fn enqueue(&self, task: Arc<Task>) -> EnqueueOutcome {
        let task_id = task.id();
        let queue = self.queue.clone();
        let metrics = self.metrics.clone();

        let handoff = tokio::spawn(async move {
            let outcome = queue.enqueue(task).await;
            match outcome {
                EnqueueOutcome::Sent => {
                    metrics.task_dispatched();
                    info!(%task_id, "Task dispatched to workers");
                }
                EnqueueOutcome::Abandoned => {
                    metrics.enqueue_abandoned();
                    warn!(%task_id, "Task not dispatched, shutdown in progress");
                }
            }
            outcome
        });

        handoff.await.unwrap_or_else(|err| {
            error!(%task_id, error = %err, "Task hand-off aborted");
            EnqueueOutcome::Abandoned
        })
    }

    pub async fn snapshot(&self, raw_id: &str) -> Result<TaskSnapshot> {
        let task = self.lookup_str(raw_id).await?;
        Ok(task.snapshot().await)
    }

    /// Resolve the on-disk archive for a Ready task.
    ///
    /// Only the exact file name the task produced is served, which keeps
    /// client-supplied names out of filesystem paths.
    pub async fn archive_path(&self, raw_id: &str, name: &str) -> Result<PathBuf> {
        let task = self.lookup_str(raw_id).await?;
        let not_found = || RegistryError::ArchiveNotFound {
            task_id: task.id(),
            name: name.to_string(),
        };

        let path = task.archive_path().await.ok_or_else(not_found)?;
        if archive_file_name(&path) != Some(name) {
            return Err(not_found());
        }
        Ok(path)
    }

    /// Apply the terminal transition and release the admission slot.
    ///
    /// Safe to call more than once for the same task: the status only
    /// changes the first time and the slot is only given back once.
    pub async fn settle(&self, task: &Task, outcome: TaskOutcome) {
        let ready = matches!(outcome, TaskOutcome::Ready { .. });
        let transitioned = task.finish(outcome).await;

        if transitioned {
            if ready {
                self.metrics.task_ready();
            } else {
                self.metrics.task_failed();
            }
        }

        if task.release_slot() {
            let released = self
                .active
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                    active.checked_sub(1)
                });
            if released.is_err() {
                warn!(task_id = %task.id(), "Slot released for a task this registry never admitted");
            }
        }

        debug!(
            task_id = %task.id(),
            transitioned,
            active = self.active_count(),
            "Task settled"
        );
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> &LinkPolicy {
        &self.policy
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::WorkReceiver;
    use crate::tasks::{LinkError, TaskStatus};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn registry() -> (Arc<TaskRegistry>, WorkReceiver, CancellationToken) {
        let token = CancellationToken::new();
        let (queue, rx) = WorkQueue::new(9, token.clone());
        let policy = LinkPolicy::new(["pdf", "jpg", "jpeg"], 3);
        let registry = TaskRegistry::new(3, policy, queue, Arc::new(Metrics::new()));
        (Arc::new(registry), rx, token)
    }

    async fn fill(registry: &TaskRegistry, task: &Task) {
        let id = task.id().to_string();
        for name in ["a.pdf", "b.jpg", "c.pdf"] {
            registry
                .attach_link(&id, &format!("http://host/{name}"))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_busy_at_capacity() {
        let (registry, _rx, _token) = registry();
        for _ in 0..3 {
            registry.create_task().await.unwrap();
        }
        assert_eq!(registry.active_count(), 3);

        let err = registry.create_task().await.unwrap_err();
        assert_eq!(err, RegistryError::Busy(3));
        assert_eq!(registry.active_count(), 3);
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn test_settle_frees_slot_exactly_once() {
        let (registry, _rx, _token) = registry();
        let task = registry.create_task().await.unwrap();
        registry.create_task().await.unwrap();
        registry.create_task().await.unwrap();

        registry
            .settle(&task, TaskOutcome::Failed { reason: "boom".into() })
            .await;
        registry
            .settle(&task, TaskOutcome::Failed { reason: "again".into() })
            .await;

        assert_eq!(registry.active_count(), 2);
        assert!(registry.create_task().await.is_ok());
        assert!(matches!(
            registry.create_task().await,
            Err(RegistryError::Busy(3))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_creation_never_exceeds_capacity() {
        let (registry, _rx, _token) = registry();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move { registry.create_task().await }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 3);
        assert_eq!(registry.active_count(), 3);
    }

    #[tokio::test]
    async fn test_third_link_enqueues_once() {
        let (registry, mut rx, _token) = registry();
        let task = registry.create_task().await.unwrap();
        fill(&registry, &task).await;

        let queued = rx.try_recv().unwrap();
        assert_eq!(queued.id(), task.id());
        assert!(rx.try_recv().is_err());

        let err = registry
            .attach_link(&task.id().to_string(), "http://host/d.pdf")
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::Link(LinkError::TaskFull(3)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_third_links_enqueue_once() {
        let (registry, mut rx, _token) = registry();
        let task = registry.create_task().await.unwrap();
        let id = task.id().to_string();
        registry.attach_link(&id, "http://host/a.pdf").await.unwrap();
        registry.attach_link(&id, "http://host/b.pdf").await.unwrap();

        let first = {
            let registry = registry.clone();
            let id = id.clone();
            tokio::spawn(async move { registry.attach_link(&id, "http://host/c.pdf").await })
        };
        let second = {
            let registry = registry.clone();
            let id = id.clone();
            tokio::spawn(async move { registry.attach_link(&id, "http://host/d.jpg").await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let dispatched = results
            .iter()
            .filter(|r| matches!(r, Ok(AttachOutcome::Dispatch)))
            .count();
        assert_eq!(dispatched, 1);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids_are_not_found() {
        let (registry, _rx, _token) = registry();
        assert!(matches!(
            registry.snapshot("not-a-uuid").await,
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            registry.snapshot(&TaskId::new().to_string()).await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_validation_errors_leave_task_untouched() {
        let (registry, _rx, _token) = registry();
        let task = registry.create_task().await.unwrap();
        let id = task.id().to_string();

        registry.attach_link(&id, "http://host/a.pdf").await.unwrap();
        assert!(matches!(
            registry.attach_link(&id, "http://host/a.pdf").await,
            Err(RegistryError::Link(LinkError::DuplicateLink(_)))
        ));
        assert!(matches!(
            registry.attach_link(&id, "http://host/a.exe").await,
            Err(RegistryError::Link(LinkError::InvalidFormat { .. }))
        ));
        assert!(matches!(
            registry.attach_link(&id, "::nope::").await,
            Err(RegistryError::Link(LinkError::InvalidUrl(_)))
        ));

        let snapshot = registry.snapshot(&id).await.unwrap();
        assert_eq!(snapshot.files.len(), 1);
        assert_eq!(snapshot.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_shutdown_stops_admissions_and_abandons_dispatch() {
        let (registry, mut rx, token) = registry();
        let task = registry.create_task().await.unwrap();

        token.cancel();
        assert_eq!(
            registry.create_task().await.unwrap_err(),
            RegistryError::ShuttingDown
        );

        fill(&registry, &task).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(task.status().await, TaskStatus::Pending);
        assert_eq!(registry.metrics().snapshot().enqueue_abandoned, 1);
    }

    #[tokio::test]
    async fn test_archive_path_requires_ready_and_matching_name() {
        let (registry, _rx, _token) = registry();
        let task = registry.create_task().await.unwrap();
        let id = task.id().to_string();

        assert!(matches!(
            registry.archive_path(&id, "archive.zip").await,
            Err(RegistryError::ArchiveNotFound { .. })
        ));

        let archive = PathBuf::from("archive").join(&id).join("archive.zip");
        registry
            .settle(&task, TaskOutcome::Ready { archive: archive.clone() })
            .await;

        assert_eq!(registry.archive_path(&id, "archive.zip").await.unwrap(), archive);
        assert!(matches!(
            registry.archive_path(&id, "../../etc/passwd").await,
            Err(RegistryError::ArchiveNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_attach_still_enqueues_completed_task() {
        let (queue, mut rx) = WorkQueue::new(1, CancellationToken::new());
        let policy = LinkPolicy::new(["pdf", "jpg", "jpeg"], 3);
        let registry = TaskRegistry::new(3, policy, queue, Arc::new(Metrics::new()));

        let first = registry.create_task().await.unwrap();
        fill(&registry, &first).await;

        let second = registry.create_task().await.unwrap();
        let id = second.id().to_string();
        registry.attach_link(&id, "http://host/a.pdf").await.unwrap();
        registry.attach_link(&id, "http://host/b.pdf").await.unwrap();

        // Queue is full, so the completing attach waits until the caller gives up.
        let gave_up = tokio::time::timeout(
            Duration::from_millis(100),
            registry.attach_link(&id, "http://host/c.pdf"),
        )
        .await
        .is_err();
        assert!(gave_up);

        assert_eq!(rx.recv().await.unwrap().id(), first.id());
        let queued = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("completed task was never enqueued")
            .unwrap();
        assert_eq!(queued.id(), second.id());

        tokio::time::timeout(Duration::from_secs(1), async {
            while registry.metrics().snapshot().tasks_dispatched < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_settling_foreign_task_keeps_counter_floor() {
        let (registry, _rx, _token) = registry();
        let stray = Task::new();

        registry
            .settle(&stray, TaskOutcome::Failed { reason: "stray".into() })
            .await;

        assert_eq!(registry.active_count(), 0);
        for _ in 0..3 {
            registry.create_task().await.unwrap();
        }
        assert_eq!(registry.create_task().await.unwrap_err(), RegistryError::Busy(3));
    }
}
