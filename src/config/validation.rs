use super::models::Config;
use thiserror::Error;

/// Largest accepted request body limit. Link attachment bodies are tiny.
pub const MAX_BODY_BYTES_CEILING: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("max_body_bytes ({actual}) exceeds limit of {limit} bytes")]
    BodyLimitTooLarge { actual: usize, limit: usize },

    #[error("allowed_extensions must not be empty")]
    NoExtensions,

    #[error("invalid extension '{0}': expected a bare extension such as \"pdf\"")]
    InvalidExtension(String),

    #[error("tmp_dir and archive_dir must be different directories ({0})")]
    SharedDirectory(String),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_server(config)?;
    validate_tasks(config)?;
    validate_storage(config)?;
    validate_download(config)?;
    Ok(())
}

fn positive(field: &'static str, value: u64) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::NotPositive { field });
    }
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    positive("server.request_timeout_secs", config.server.request_timeout_secs)?;
    positive("server.max_body_bytes", config.server.max_body_bytes as u64)?;

    if config.server.max_body_bytes > MAX_BODY_BYTES_CEILING {
        return Err(ValidationError::BodyLimitTooLarge {
            actual: config.server.max_body_bytes,
            limit: MAX_BODY_BYTES_CEILING,
        });
    }

    Ok(())
}

fn validate_tasks(config: &Config) -> Result<(), ValidationError> {
    let tasks = &config.tasks;
    positive("tasks.max_active_tasks", tasks.max_active_tasks as u64)?;
    positive("tasks.files_per_task", tasks.files_per_task as u64)?;
    positive("tasks.workers", tasks.workers as u64)?;
    positive("tasks.queue_capacity", tasks.queue_capacity as u64)?;

    if tasks.allowed_extensions.is_empty() {
        return Err(ValidationError::NoExtensions);
    }

    for ext in &tasks.allowed_extensions {
        let bad = ext.trim().is_empty()
            || ext.contains('.')
            || ext.contains('/')
            || ext.chars().any(char::is_whitespace);
        if bad {
            return Err(ValidationError::InvalidExtension(ext.clone()));
        }
    }

    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.tmp_dir == config.storage.archive_dir {
        return Err(ValidationError::SharedDirectory(
            config.storage.tmp_dir.display().to_string(),
        ));
    }
    Ok(())
}

fn validate_download(config: &Config) -> Result<(), ValidationError> {
    positive("download.connect_timeout_secs", config.download.connect_timeout_secs)?;
    positive("download.read_timeout_secs", config.download.read_timeout_secs)?;
    Ok(())
}
