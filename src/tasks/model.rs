use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::LinkError;
use super::validation::LinkPolicy;

/// Route prefix under which finished archives are served.
pub const ARCHIVE_LINK_PREFIX: &str = "/archive";

/// Opaque task identifier. Time-ordered UUIDv7, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Ready,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Ready | TaskStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Ready,
    Error,
}

/// One file's download and archive record within a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub url: String,
    #[serde(rename = "name", skip_serializing_if = "Option::is_none")]
    pub local_name: Option<String>,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileEntry {
    pub fn pending(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            local_name: None,
            status: FileStatus::Pending,
            error: None,
        }
    }

    pub fn mark_ready(&mut self, local_name: impl Into<String>) {
        self.local_name = Some(local_name.into());
        self.status = FileStatus::Ready;
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = FileStatus::Error;
        self.error = Some(error.into());
    }

    pub fn is_ready(&self) -> bool {
        self.status == FileStatus::Ready
    }
}

/// Result of a successful link attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The link was stored; the task still waits for more links.
    Accepted { files: usize },
    /// The link completed the task. The caller must enqueue it, and is the
    /// only caller that will ever see this variant for this task.
    Dispatch,
}

/// How the pipeline ended for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Ready { archive: PathBuf },
    Failed { reason: String },
}

/// Point-in-time copy of a task, safe to hand to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub status: TaskStatus,
    pub files: Vec<FileEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct TaskState {
    files: Vec<FileEntry>,
    status: TaskStatus,
    dispatched: bool,
    archive: Option<PathBuf>,
    error: Option<String>,
    updated_at: DateTime<Utc>,
}

/// Unit of work: up to `files_per_task` downloads and their combined archive.
///
/// Mutable fields sit behind the task's own lock, independent from the
/// registry map lock. Nothing in here holds that lock across I/O.
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    created_at: DateTime<Utc>,
    holds_slot: AtomicBool,
    state: RwLock<TaskState>,
}

impl Task {
    /// Creates a pending task that owns one admission slot.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            created_at: now,
            holds_slot: AtomicBool::new(true),
            state: RwLock::new(TaskState {
                files: Vec::new(),
                status: TaskStatus::Pending,
                dispatched: false,
                archive: None,
                error: None,
                updated_at: now,
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub async fn status(&self) -> TaskStatus {
        self.state.read().await.status
    }

    /// Validates and appends a link.
    ///
    /// The capacity check, the duplicate check, the append and the dispatch
    /// decision all run under one write lock, so two concurrent callers can
    /// never both complete the task.
    pub async fn attach(&self, raw_url: &str, policy: &LinkPolicy) -> Result<AttachOutcome, LinkError> {
        let mut state = self.state.write().await;
        let limit = policy.files_per_task();

        if state.dispatched || state.files.len() >= limit {
            return Err(LinkError::TaskFull(limit));
        }

        let url = policy.normalize(raw_url)?;
        if state.files.iter().any(|file| file.url == url) {
            return Err(LinkError::DuplicateLink(url));
        }

        state.files.push(FileEntry::pending(url));
        state.updated_at = Utc::now();

        if state.files.len() == limit {
            state.dispatched = true;
            Ok(AttachOutcome::Dispatch)
        } else {
            Ok(AttachOutcome::Accepted {
                files: state.files.len(),
            })
        }
    }

    /// Moves a dispatched task to InProgress and returns a private copy of
    /// its files. Returns `None` when the task is not in a dispatchable state.
    pub async fn begin(&self) -> Option<Vec<FileEntry>> {
        let mut state = self.state.write().await;
        if !state.dispatched || state.status != TaskStatus::Pending {
            return None;
        }
        state.status = TaskStatus::InProgress;
        state.updated_at = Utc::now();
        Some(state.files.clone())
    }

    /// Publishes per-file outcomes computed outside the lock.
    pub async fn publish_files(&self, files: Vec<FileEntry>) {
        let mut state = self.state.write().await;
        if state.status != TaskStatus::InProgress {
            return;
        }
        state.files = files;
        state.updated_at = Utc::now();
    }

    /// Applies the terminal transition. Returns `false` when the task had
    /// already reached a terminal status, in which case nothing changes.
    pub async fn finish(&self, outcome: TaskOutcome) -> bool {
        let mut state = self.state.write().await;
        if state.status.is_terminal() {
            return false;
        }
        match outcome {
            TaskOutcome::Ready { archive } => {
                state.status = TaskStatus::Ready;
                state.archive = Some(archive);
                state.error = None;
            }
            TaskOutcome::Failed { reason } => {
                state.status = TaskStatus::Error;
                state.archive = None;
                state.error = Some(reason);
            }
        }
        state.updated_at = Utc::now();
        true
    }

    /// Gives the admission slot back. Only the first call returns `true`.
    pub(crate) fn release_slot(&self) -> bool {
        self.holds_slot.swap(false, Ordering::AcqRel)
    }

    /// Path of the produced archive, only once the task is Ready.
    pub async fn archive_path(&self) -> Option<PathBuf> {
        let state = self.state.read().await;
        match state.status {
            TaskStatus::Ready => state.archive.clone(),
            _ => None,
        }
    }

    pub async fn snapshot(&self) -> TaskSnapshot {
        let state = self.state.read().await;
        let archive_link = match state.status {
            TaskStatus::Ready => state
                .archive
                .as_deref()
                .and_then(archive_file_name)
                .map(|name| format!("{ARCHIVE_LINK_PREFIX}/{}/{name}", self.id)),
            _ => None,
        };

        TaskSnapshot {
            id: self.id,
            status: state.status,
            files: state.files.clone(),
            archive_link,
            error: state.error.clone(),
            created_at: self.created_at,
            updated_at: state.updated_at,
        }
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn archive_file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn policy() -> LinkPolicy {
        LinkPolicy::new(["pdf", "jpg", "jpeg"], 3)
    }

    #[tokio::test]
    async fn third_link_requests_dispatch() {
        let task = Task::new();
        let policy = policy();

        assert_eq!(
            task.attach("http://host/a.pdf", &policy).await.unwrap(),
            AttachOutcome::Accepted { files: 1 }
        );
        assert_eq!(
            task.attach("http://host/b.jpg", &policy).await.unwrap(),
            AttachOutcome::Accepted { files: 2 }
        );
        assert_eq!(
            task.attach("http://host/c.pdf", &policy).await.unwrap(),
            AttachOutcome::Dispatch
        );
        assert_eq!(task.status().await, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn fourth_link_is_rejected_even_when_invalid() {
        let task = Task::new();
        let policy = policy();
        for name in ["a", "b", "c"] {
            task.attach(&format!("http://host/{name}.pdf"), &policy).await.unwrap();
        }

        let err = task.attach("http://host/d.pdf", &policy).await.unwrap_err();
        assert_eq!(err, LinkError::TaskFull(3));
        let err = task.attach("garbage", &policy).await.unwrap_err();
        assert_eq!(err, LinkError::TaskFull(3));

        assert_eq!(task.snapshot().await.files.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_after_normalization_is_rejected() {
        let task = Task::new();
        let policy = policy();
        task.attach("http://host/a.pdf", &policy).await.unwrap();

        let err = task.attach("  HTTP://HOST/a.pdf ", &policy).await.unwrap_err();
        assert_eq!(err, LinkError::DuplicateLink("http://host/a.pdf".to_string()));
        assert_eq!(task.snapshot().await.files.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_third_links_dispatch_once() {
        let task = Arc::new(Task::new());
        let policy = Arc::new(policy());
        task.attach("http://host/a.pdf", &policy).await.unwrap();
        task.attach("http://host/b.pdf", &policy).await.unwrap();

        let mut handles = Vec::new();
        for name in ["c", "d", "e", "f"] {
            let task = task.clone();
            let policy = policy.clone();
            handles.push(tokio::spawn(async move {
                task.attach(&format!("http://host/{name}.pdf"), &policy).await
            }));
        }

        let mut dispatches = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(AttachOutcome::Dispatch) => dispatches += 1,
                Ok(other) => panic!("unexpected outcome {other:?}"),
                Err(err) => assert_eq!(err, LinkError::TaskFull(3)),
            }
        }
        assert_eq!(dispatches, 1);
        assert_eq!(task.snapshot().await.files.len(), 3);
    }

    #[tokio::test]
    async fn begin_requires_dispatch_and_runs_once() {
        let task = Task::new();
        let policy = policy();
        assert!(task.begin().await.is_none());

        for name in ["a", "b", "c"] {
            task.attach(&format!("http://host/{name}.pdf"), &policy).await.unwrap();
        }
        let files = task.begin().await.unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(task.status().await, TaskStatus::InProgress);
        assert!(task.begin().await.is_none());
    }

    #[tokio::test]
    async fn terminal_status_is_final() {
        let task = Task::new();
        assert!(task.finish(TaskOutcome::Failed { reason: "boom".into() }).await);
        assert!(
            !task
                .finish(TaskOutcome::Ready { archive: PathBuf::from("x/archive.zip") })
                .await
        );

        let snapshot = task.snapshot().await;
        assert_eq!(snapshot.status, TaskStatus::Error);
        assert_eq!(snapshot.error.as_deref(), Some("boom"));
        assert!(snapshot.archive_link.is_none());
        assert!(task.archive_path().await.is_none());
    }

    #[tokio::test]
    async fn ready_snapshot_exposes_archive_link() {
        let task = Task::new();
        task.finish(TaskOutcome::Ready {
            archive: PathBuf::from("archive").join(task.id().to_string()).join("archive.zip"),
        })
        .await;

        let snapshot = task.snapshot().await;
        assert_eq!(
            snapshot.archive_link,
            Some(format!("/archive/{}/archive.zip", task.id()))
        );
    }

    #[test]
    fn slot_is_released_once() {
        let task = Task::new();
        assert!(task.release_slot());
        assert!(!task.release_slot());
    }

    #[test]
    fn snapshot_serializes_snake_case_status() {
        let value = serde_json::to_value(TaskStatus::InProgress).unwrap();
        assert_eq!(value, serde_json::json!("in_progress"));
    }
}
