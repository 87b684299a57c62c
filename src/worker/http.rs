//! HTTP client for downloading resources to local storage

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, header::CONTENT_DISPOSITION};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::filename::local_name;
use crate::config::DownloadConfig;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("HTTP {status}: {reason}")]
    BadStatus { status: u16, reason: String },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DownloadError>;

/// A file fully written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub local_name: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Fetches one URL into a directory.
///
/// The pipeline depends on this seam rather than on [`HttpClient`] directly.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest_dir: &Path, slot: usize) -> Result<DownloadedFile>;
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            user_agent: concat!("fetchzip/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl From<&DownloadConfig> for HttpConfig {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// HTTP downloader
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| DownloadError::Config(e.to_string()))?;

        Ok(Self { client })
    }

    /// Download once (no retry) and stream the body to `dest_dir`.
    ///
    /// The file is flushed and synced before this returns `Ok`; on any
    /// failure after the file was created, the partial file is removed.
    pub async fn download_to_file(
        &self,
        url: &str,
        dest_dir: &Path,
        slot: usize,
    ) -> Result<DownloadedFile> {
        debug!(url, slot, "Starting download");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::Timeout
            } else {
                DownloadError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::BadStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let name = local_name(slot, url, disposition.as_deref());
        let path = dest_dir.join(&name);

        match stream_to_file(response, &path).await {
            Ok(bytes) => {
                debug!(url, slot, bytes, file = %path.display(), "Download completed");
                Ok(DownloadedFile {
                    local_name: name,
                    path,
                    bytes,
                })
            }
            Err(err) => {
                if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(file = %path.display(), error = %cleanup, "Failed to remove partial download");
                    }
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch(&self, url: &str, dest_dir: &Path, slot: usize) -> Result<DownloadedFile> {
        self.download_to_file(url, dest_dir, slot).await
    }
}

async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<u64> {
    let write_err = |source: std::io::Error| DownloadError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::create(path).await.map_err(write_err)?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            if e.is_timeout() {
                DownloadError::Timeout
            } else {
                DownloadError::RequestFailed(format!("Failed to read body: {e}"))
            }
        })?;
        file.write_all(&chunk).await.map_err(write_err)?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(write_err)?;
    file.sync_all().await.map_err(write_err)?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert!(config.user_agent.starts_with("fetchzip/"));
    }

    #[tokio::test]
    async fn test_download_writes_prefixed_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/a.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 body".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = HttpClient::new(HttpConfig::default()).unwrap();
        let file = client
            .download_to_file(&format!("{}/docs/a.pdf", server.uri()), dir.path(), 0)
            .await
            .unwrap();

        assert_eq!(file.local_name, "0_a.pdf");
        assert_eq!(file.bytes, 13);
        assert_eq!(std::fs::read(&file.path).unwrap(), b"%PDF-1.4 body");
    }

    #[tokio::test]
    async fn test_download_uses_content_disposition() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fetch.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Disposition", r#"attachment; filename="paper.pdf""#)
                    .set_body_bytes(b"bytes".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = HttpClient::new(HttpConfig::default()).unwrap();
        let file = client
            .download_to_file(&format!("{}/fetch.pdf", server.uri()), dir.path(), 2)
            .await
            .unwrap();

        assert_eq!(file.local_name, "2_paper.pdf");
        assert!(dir.path().join("2_paper.pdf").exists());
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error_and_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = HttpClient::new(HttpConfig::default()).unwrap();
        let err = client
            .download_to_file(&format!("{}/missing.jpg", server.uri()), dir.path(), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::BadStatus { status: 404, .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unwritable_destination_is_a_write_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");
        let client = HttpClient::new(HttpConfig::default()).unwrap();
        let err = client
            .download_to_file(&format!("{}/a.pdf", server.uri()), &missing, 0)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Write { .. }));
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_request_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = TempDir::new().unwrap();
        let client = HttpClient::new(HttpConfig::default()).unwrap();
        let err = client
            .download_to_file(&format!("http://{addr}/a.pdf"), dir.path(), 0)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::RequestFailed(_)), "got {err:?}");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
