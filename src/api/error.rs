use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use super::models::ErrorResponse;
use crate::registry::RegistryError;
use crate::tasks::LinkError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payload invalid: {0}")]
    InvalidPayload(String),
    #[error("payload exceeds {0} bytes")]
    PayloadTooLarge(usize),
    #[error("server busy: {0} tasks already in progress")]
    Busy(usize),
    #[error("server is shutting down")]
    ShuttingDown,
    #[error("task already has {0} links")]
    TaskFull(usize),
    #[error("link already attached: {0}")]
    DuplicateLink(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("unsupported file type: {url} (allowed: {allowed})")]
    InvalidFormat { url: String, allowed: String },
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_)
            | ApiError::DuplicateLink(_)
            | ApiError::InvalidUrl(_)
            | ApiError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Busy(_) | ApiError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::TaskFull(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::Busy(_) => "BUSY",
            ApiError::ShuttingDown => "SHUTTING_DOWN",
            ApiError::TaskFull(_) => "TASK_FULL",
            ApiError::DuplicateLink(_) => "DUPLICATE_LINK",
            ApiError::InvalidUrl(_) => "INVALID_URL",
            ApiError::InvalidFormat { .. } => "INVALID_FORMAT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}

impl From<LinkError> for ApiError {
    fn from(value: LinkError) -> Self {
        match value {
            LinkError::TaskFull(limit) => ApiError::TaskFull(limit),
            LinkError::DuplicateLink(url) => ApiError::DuplicateLink(url),
            LinkError::InvalidUrl(url) => ApiError::InvalidUrl(url),
            LinkError::InvalidFormat { url, allowed } => ApiError::InvalidFormat { url, allowed },
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(value: RegistryError) -> Self {
        match value {
            RegistryError::Busy(capacity) => ApiError::Busy(capacity),
            RegistryError::ShuttingDown => ApiError::ShuttingDown,
            RegistryError::NotFound(id) => ApiError::NotFound(format!("task {id}")),
            RegistryError::ArchiveNotFound { task_id, name } => {
                ApiError::NotFound(format!("archive {name} of task {task_id}"))
            }
            RegistryError::Link(err) => err.into(),
        }
    }
}
