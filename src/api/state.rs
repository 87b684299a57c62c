use std::sync::Arc;

use crate::config::Config;
use crate::observability::Metrics;
use crate::registry::TaskRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<TaskRegistry>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, registry: Arc<TaskRegistry>) -> Self {
        let metrics = registry.metrics().clone();
        Self {
            config: Arc::new(config),
            registry,
            metrics,
        }
    }
}
