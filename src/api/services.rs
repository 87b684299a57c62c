use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::{
    models::{AddLinkRequest, HealthResponse},
    state::AppState,
    utils::{attachment_disposition, parse_content_type},
};
use crate::api::error::ApiError;

/// Task creation endpoint (POST /tasks)
///
/// Admits a new empty task if fewer than `max_active_tasks` tasks are
/// unfinished. Returns 201 with the task snapshot, or 503 when the service
/// is at capacity or shutting down.
pub async fn create_task(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let task = state.registry.create_task().await?;
    Ok((StatusCode::CREATED, Json(task.snapshot().await)))
}

/// Task status endpoint (GET /tasks/{task_id})
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.registry.snapshot(&task_id).await?;
    Ok((StatusCode::OK, Json(snapshot)))
}

/// Link attachment endpoint (POST /tasks/{task_id})
///
/// ## Flow:
/// 1. Require `Content-Type: application/json`
/// 2. Read the body up to `server.max_body_bytes`
/// 3. Deserialize `{"url": "..."}`
/// 4. Attach the link; the link that completes the task dispatches it to
///    the workers before this handler returns
///
/// Returns 204 No Content on success. Validation failures leave the task
/// untouched.
pub async fn add_link(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    parse_content_type(content_type)?;

    let body = read_body(body, state.config.server.max_body_bytes).await?;
    let request: AddLinkRequest = serde_json::from_slice(&body)?;

    let outcome = state.registry.attach_link(&task_id, &request.url).await?;
    debug!(%task_id, ?outcome, "Link accepted");

    Ok(StatusCode::NO_CONTENT)
}

/// Reads the request body, failing once it grows past `limit`.
///
/// Decompression is handled by the router's middleware, so the limit
/// applies to the decoded payload.
async fn read_body(body: Body, limit: usize) -> Result<Bytes, ApiError> {
    let collected = Limited::new(body, limit).collect().await.map_err(|err| {
        if err.downcast_ref::<LengthLimitError>().is_some() {
            ApiError::PayloadTooLarge(limit)
        } else {
            ApiError::InvalidPayload(err.to_string())
        }
    })?;

    Ok(collected.to_bytes())
}

/// Archive download endpoint (GET /archive/{task_id}/{file_name})
///
/// Streams the zip of a Ready task. Any other task state, or a name other
/// than the one the task produced, is a 404.
pub async fn fetch_archive(
    State(state): State<AppState>,
    Path((task_id, file_name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let path = state.registry.archive_path(&task_id, &file_name).await?;

    let file = tokio::fs::File::open(&path).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            ApiError::NotFound(format!("archive {file_name} of task {task_id}"))
        } else {
            ApiError::Internal(format!("failed to open archive: {err}"))
        }
    })?;
    let length = file
        .metadata()
        .await
        .map_err(|err| ApiError::Internal(format!("failed to stat archive: {err}")))?
        .len();

    info!(%task_id, file = %file_name, bytes = length, "Serving archive");

    let disposition = HeaderValue::from_str(&attachment_disposition(&file_name))
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    Ok(response)
}

/// Health check endpoint (GET /health)
///
/// Reports admission load and the process counters. Always 200 while the
/// server can answer; `shutting_down` tells load balancers to back off.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let registry = &state.registry;
    let shutting_down = registry.queue().is_shutting_down();

    let response = HealthResponse {
        status: if shutting_down { "shutting_down" } else { "healthy" },
        version: env!("CARGO_PKG_VERSION"),
        active_tasks: registry.active_count(),
        max_active_tasks: registry.capacity(),
        queued_tasks: registry.queue().pending(),
        shutting_down,
        metrics: state.metrics.snapshot(),
    };

    (StatusCode::OK, Json(response))
}
