use std::sync::Arc;
use std::time::Duration;

use axum::{Router, http::StatusCode, routing::get, routing::post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    decompression::RequestDecompressionLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::info;

use super::{
    services::{add_link, create_task, fetch_archive, get_task, health},
    state::AppState,
};
use crate::config::Config;
use crate::observability::Metrics;
use crate::queue::WorkQueue;
use crate::registry::TaskRegistry;
use crate::shutdown::{ShutdownCoordinator, shutdown_signal};
use crate::tasks::LinkPolicy;
use crate::worker::{Fetcher, HttpClient, HttpConfig, RunnerSettings, TaskRunner, WorkerPool};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything a running service is made of.
pub struct App {
    pub router: Router,
    pub registry: Arc<TaskRegistry>,
    pub pool: WorkerPool,
    pub coordinator: ShutdownCoordinator,
}

/// HTTP routes over shared state.
pub fn router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/tasks", post(create_task))
        .route("/tasks/{task_id}", get(get_task).post(add_link))
        .route("/archive/{task_id}/{file_name}", get(fetch_archive))
        .route("/health", get(health))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
                // Handlers see the decoded body; Content-Encoding is handled here
                .layer(RequestDecompressionLayer::new()),
        )
}

/// Create the storage directories, the queue, the registry and the worker
/// pool, wired together.
pub async fn build(config: Config, fetcher: Arc<dyn Fetcher>) -> Result<App, AnyError> {
    for dir in [&config.storage.tmp_dir, &config.storage.archive_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| format!("Failed to create directory {}: {}", dir.display(), e))?;
    }

    let tasks = &config.tasks;
    let (queue, receiver) = WorkQueue::new(tasks.queue_capacity, CancellationToken::new());
    let policy = LinkPolicy::new(&tasks.allowed_extensions, tasks.files_per_task);
    let registry = Arc::new(TaskRegistry::new(
        tasks.max_active_tasks,
        policy,
        queue,
        Arc::new(Metrics::new()),
    ));

    let settings = RunnerSettings::builder()
        .tmp_dir(config.storage.tmp_dir.clone())
        .archive_dir(config.storage.archive_dir.clone())
        .build();
    let runner = Arc::new(TaskRunner::new(settings, fetcher, registry.clone()));
    let pool = WorkerPool::spawn(tasks.workers, receiver, runner);

    let coordinator = ShutdownCoordinator::new(registry.clone(), config.storage.tmp_dir.clone());
    let router = router(AppState::new(config, registry.clone()));

    Ok(App {
        router,
        registry,
        pool,
        coordinator,
    })
}

/// Serve until a shutdown signal, then drain the workers.
pub async fn run(config: Config) -> Result<(), AnyError> {
    let address = config.server.bind_addr;
    let fetcher = HttpClient::new(HttpConfig::from(&config.download))
        .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

    let App {
        router,
        registry,
        pool,
        coordinator,
    } = build(config, Arc::new(fetcher)).await?;

    let listener = TcpListener::bind(address).await?;
    info!(%address, "fetchzip API listening");

    let stop_admissions = registry.queue().shutdown_token();
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            stop_admissions.cancel();
        })
        .await?;

    coordinator.drain(pool).await;
    Ok(())
}
