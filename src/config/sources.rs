use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "FETCHZIP_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/fetchzip.toml";
const ENV_PREFIX: &str = "FETCHZIP";
const ENV_SEPARATOR: &str = "__";

/// Short variable names understood for compatibility with older deployments.
const LEGACY_PORT: &str = "APP_PORT";
const LEGACY_TMP_DIR: &str = "TMP_DIRECTORY";
const LEGACY_ARCHIVE_DIR: &str = "ARCH_DIRECTORY";
const LEGACY_EXTENSIONS: &str = "VALID_EXTENTIONS";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables, `FETCHZIP__*` first, then legacy names
pub fn load() -> Result<Config, ConfigError> {
    load_with_path(None)
}

/// Same as [`load`], with an explicit file taking precedence over
/// `FETCHZIP_CONFIG`.
pub fn load_with_path(path: Option<PathBuf>) -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = path
        .or_else(|| env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    apply_legacy_env(&mut config, |key| env::var(key).ok())?;

    Ok(config)
}

/// Load configuration from a specific path and `FETCHZIP__*` variables.
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // FETCHZIP__TASKS__WORKERS -> tasks.workers
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .list_separator(",")
            .with_list_parse_key("tasks.allowed_extensions")
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

/// Apply the short variable names. `lookup` abstracts the environment so the
/// mapping can be tested without mutating process state.
pub(super) fn apply_legacy_env<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup(LEGACY_PORT) {
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|e| ConfigError::Message(format!("{LEGACY_PORT}: invalid port '{port}': {e}")))?;
        config.server.bind_addr = SocketAddr::new(config.server.bind_addr.ip(), port);
    }

    if let Some(dir) = lookup(LEGACY_TMP_DIR).filter(|v| !v.is_empty()) {
        config.storage.tmp_dir = PathBuf::from(dir);
    }

    if let Some(dir) = lookup(LEGACY_ARCHIVE_DIR).filter(|v| !v.is_empty()) {
        config.storage.archive_dir = PathBuf::from(dir);
    }

    if let Some(raw) = lookup(LEGACY_EXTENSIONS) {
        config.tasks.allowed_extensions = serde_json::from_str(&raw).map_err(|e| {
            ConfigError::Message(format!("{LEGACY_EXTENSIONS}: expected a JSON array of strings: {e}"))
        })?;
    }

    Ok(())
}
