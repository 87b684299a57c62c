//! Task runner - drives one dispatched task from download to archive

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bon::Builder;
use futures_util::future::join_all;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::archive::{self, ArchiveError, ArchiveReport};
use super::http::Fetcher;
use crate::registry::TaskRegistry;
use crate::tasks::{FileEntry, Task, TaskId, TaskOutcome};

/// Task-fatal pipeline failures.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("failed to create temp directory {path}: {source}")]
    TempDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create archive directory {path}: {source}")]
    ArchiveDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("archive worker aborted: {0}")]
    Aborted(String),
}

pub type Result<T> = std::result::Result<T, TaskError>;

/// Filesystem layout used by the runner.
#[derive(Debug, Clone, Builder)]
pub struct RunnerSettings {
    #[builder(into)]
    pub tmp_dir: PathBuf,
    #[builder(into)]
    pub archive_dir: PathBuf,
}

/// Runs the download/archive pipeline for dispatched tasks.
pub struct TaskRunner {
    settings: RunnerSettings,
    fetcher: Arc<dyn Fetcher>,
    registry: Arc<TaskRegistry>,
}

impl TaskRunner {
    pub fn new(
        settings: RunnerSettings,
        fetcher: Arc<dyn Fetcher>,
        registry: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            settings,
            fetcher,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Scratch directory holding one task's downloads.
    pub fn task_tmp_dir(&self, task_id: TaskId) -> PathBuf {
        self.settings.tmp_dir.join(task_id.to_string())
    }

    /// Best-effort removal of a task's scratch directory.
    pub async fn discard_tmp(&self, task_id: TaskId) {
        remove_dir(&self.task_tmp_dir(task_id)).await;
    }

    /// Process one task to a terminal status.
    ///
    /// Tasks that are not in a dispatchable state are skipped untouched.
    pub async fn run(&self, task: Arc<Task>) {
        let task_id = task.id();
        let Some(files) = task.begin().await else {
            warn!(%task_id, "Skipping task that is not ready for processing");
            return;
        };

        info!(%task_id, files = files.len(), "Processing task");

        let task_tmp = self.task_tmp_dir(task_id);
        let outcome = match self.process(&task, files, &task_tmp).await {
            Ok(archive) => TaskOutcome::Ready { archive },
            Err(err) => {
                error!(%task_id, error = %err, "Task failed");
                TaskOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        };

        remove_dir(&task_tmp).await;
        self.registry.settle(&task, outcome).await;

        let status = task.status().await;
        info!(%task_id, ?status, "Task finished");
    }

    async fn process(&self, task: &Task, files: Vec<FileEntry>, task_tmp: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(task_tmp)
            .await
            .map_err(|source| TaskError::TempDir {
                path: task_tmp.to_path_buf(),
                source,
            })?;

        let files = self.download_all(files, task_tmp).await;
        task.publish_files(files.clone()).await;

        let task_dir = task.id().to_string();
        let task_archive_dir = self.settings.archive_dir.join(&task_dir);
        let archive_root = self.settings.archive_dir.clone();
        let dest = tokio::task::spawn_blocking(move || {
            archive::prepare_destination(&archive_root, &task_dir)
        })
        .await
        .map_err(|e| TaskError::Aborted(e.to_string()))?
        .map_err(|source| TaskError::ArchiveDir {
            path: task_archive_dir,
            source,
        })?;

        let report = self.write_archive(files, task_tmp, &dest).await?;
        if !report.errors.is_empty() {
            warn!(
                task_id = %task.id(),
                skipped = report.errors.len(),
                "Some files were left out of the archive"
            );
        }
        task.publish_files(report.files).await;

        debug!(task_id = %task.id(), archived = report.archived, archive = %dest.display(), "Archive written");
        Ok(dest)
    }

    async fn download_all(&self, mut files: Vec<FileEntry>, dir: &Path) -> Vec<FileEntry> {
        let downloads = files.iter().enumerate().map(|(slot, entry)| {
            let fetcher = self.fetcher.clone();
            let url = entry.url.clone();
            async move { fetcher.fetch(&url, dir, slot).await }
        });
        let results = join_all(downloads).await;

        let metrics = self.registry.metrics();
        for (entry, result) in files.iter_mut().zip(results) {
            match result {
                Ok(file) => {
                    metrics.file_downloaded();
                    entry.mark_ready(file.local_name);
                }
                Err(err) => {
                    metrics.file_failed();
                    warn!(url = %entry.url, error = %err, "Download failed");
                    entry.mark_failed(err.to_string());
                }
            }
        }

        files
    }

    async fn write_archive(&self, files: Vec<FileEntry>, base: &Path, dest: &Path) -> Result<ArchiveReport> {
        let base = base.to_path_buf();
        let dest = dest.to_path_buf();

        let report = tokio::task::spawn_blocking(move || archive::write_archive(files, &base, &dest))
            .await
            .map_err(|e| TaskError::Aborted(e.to_string()))??;

        Ok(report)
    }
}

async fn remove_dir(path: &Path) {
    if let Err(err) = tokio::fs::remove_dir_all(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %path.display(), error = %err, "Failed to remove temp directory");
        }
    }
}
