//! Request and response bodies of the HTTP API.
//!
//! Task snapshots are serialized straight from
//! [`TaskSnapshot`](crate::tasks::TaskSnapshot); this module only holds the
//! shapes that exist for the transport.
//!
//! ```json
//! POST /tasks/{id}
//! {"url": "https://example.com/docs/report.pdf"}
//! ```

use serde::{Deserialize, Serialize};

use crate::observability::MetricsSnapshot;

/// Body of `POST /tasks/{id}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AddLinkRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_tasks: usize,
    pub max_active_tasks: usize,
    pub queued_tasks: usize,
    pub shutting_down: bool,
    pub metrics: MetricsSnapshot,
}
