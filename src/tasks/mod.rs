//! Task model and link attachment rules
//!
//! A [`Task`] groups a fixed number of download links. Links are validated by
//! a [`LinkPolicy`]; the attachment that completes a task is the one that
//! hands it to the work queue.

mod error;
mod model;
mod validation;

pub use error::LinkError;
pub use model::{
    ARCHIVE_LINK_PREFIX, AttachOutcome, FileEntry, FileStatus, Task, TaskId, TaskOutcome,
    TaskSnapshot, TaskStatus,
};
pub(crate) use model::archive_file_name;
pub use validation::LinkPolicy;
