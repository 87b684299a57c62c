use thiserror::Error;

/// Rejections produced while attaching a link to a task.
///
/// None of these mutate the task.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("task already contains the maximum number of files ({0})")]
    TaskFull(usize),
    #[error("link '{0}' is already attached to this task")]
    DuplicateLink(String),
    #[error("invalid download link '{0}'")]
    InvalidUrl(String),
    #[error("unsupported file type for '{url}': accepted extensions are {allowed}")]
    InvalidFormat { url: String, allowed: String },
}
