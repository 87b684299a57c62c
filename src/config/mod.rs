//! Configuration management for fetchzip
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use fetchzip::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `FETCHZIP__<section>__<key>`
//!
//! Examples:
//! - `FETCHZIP__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `FETCHZIP__TASKS__WORKERS=5`
//! - `FETCHZIP__TASKS__ALLOWED_EXTENSIONS=pdf,jpg,png`
//!
//! The short names `APP_PORT`, `TMP_DIRECTORY`, `ARCH_DIRECTORY` and
//! `VALID_EXTENTIONS` (a JSON array) are applied last.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/fetchzip.toml`.
//! This can be overridden using the `FETCHZIP_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{Config, DownloadConfig, ServerConfig, StorageConfig, TasksConfig};
pub use validation::{MAX_BODY_BYTES_CEILING, ValidationError};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file or an override is
    /// malformed, or if validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Like [`Config::load`], reading `path` instead of the default file.
    /// Environment overrides still apply.
    pub fn load_with_override(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load_with_path(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}
