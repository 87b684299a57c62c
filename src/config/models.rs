use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub download: DownloadConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Upper bound for a single request handler, not for background work.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

/// Local directories for downloads and produced archives
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            tmp_dir: default_tmp_dir(),
            archive_dir: default_archive_dir(),
        }
    }
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("archive")
}

/// Admission, batching and worker limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TasksConfig {
    #[serde(default = "default_max_active_tasks")]
    pub max_active_tasks: usize,
    #[serde(default = "default_files_per_task")]
    pub files_per_task: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            max_active_tasks: default_max_active_tasks(),
            files_per_task: default_files_per_task(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_max_active_tasks() -> usize {
    3
}

fn default_files_per_task() -> usize {
    3
}

fn default_workers() -> usize {
    3
}

fn default_queue_capacity() -> usize {
    9
}

fn default_allowed_extensions() -> Vec<String> {
    ["pdf", "jpg", "jpeg"].map(String::from).to_vec()
}

/// Outbound HTTP client settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    concat!("fetchzip/", env!("CARGO_PKG_VERSION")).to_string()
}
