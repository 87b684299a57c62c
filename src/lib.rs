pub mod api;
pub mod config;
pub mod observability;
pub mod queue;
pub mod registry;
pub mod shutdown;
pub mod tasks;
pub mod worker;
