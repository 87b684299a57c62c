use thiserror::Error;

use crate::tasks::{LinkError, TaskId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("already processing the maximum number of tasks ({0}), try again later")]
    Busy(usize),

    #[error("service is shutting down")]
    ShuttingDown,

    #[error("task {0} not found")]
    NotFound(String),

    #[error("archive '{name}' for task {task_id} not found")]
    ArchiveNotFound { task_id: TaskId, name: String },

    #[error(transparent)]
    Link(#[from] LinkError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
