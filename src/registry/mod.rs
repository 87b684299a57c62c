//! Concurrent task registry
//!
//! Owns every task for the lifetime of the process (nothing is persisted),
//! enforces the admission limit and dispatches completed tasks to the
//! [`WorkQueue`](crate::queue::WorkQueue).

pub mod error;
pub mod store;

pub use error::{RegistryError, Result};
pub use store::TaskRegistry;
