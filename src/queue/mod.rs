pub mod broker;

pub use broker::{EnqueueOutcome, WorkQueue, WorkReceiver};
