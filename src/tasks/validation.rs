use url::Url;

use super::error::LinkError;

/// Rules applied to every link before it is attached to a task.
#[derive(Debug, Clone)]
pub struct LinkPolicy {
    allowed_extensions: Vec<String>,
    files_per_task: usize,
}

impl LinkPolicy {
    pub fn new<I, S>(allowed_extensions: I, files_per_task: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_extensions = allowed_extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Self {
            allowed_extensions,
            files_per_task,
        }
    }

    /// Number of files that completes a task and triggers dispatch.
    pub fn files_per_task(&self) -> usize {
        self.files_per_task
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Trims, parses and canonicalizes a raw link.
    ///
    /// Two links that normalize to the same string are duplicates: scheme and
    /// host are lower-cased, default ports are dropped and the fragment is
    /// removed. Path and query keep their case.
    pub fn normalize(&self, raw: &str) -> Result<String, LinkError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LinkError::InvalidUrl(String::new()));
        }

        let mut url =
            Url::parse(trimmed).map_err(|_| LinkError::InvalidUrl(trimmed.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(LinkError::InvalidUrl(trimmed.to_string()));
        }
        url.set_fragment(None);

        let extension = extension_of(&url);
        let accepted = extension
            .as_deref()
            .is_some_and(|ext| self.allowed_extensions.iter().any(|allowed| allowed == ext));

        if !accepted {
            return Err(LinkError::InvalidFormat {
                url: url.to_string(),
                allowed: self.allowed_extensions.join(", "),
            });
        }

        Ok(url.to_string())
    }
}

fn extension_of(url: &Url) -> Option<String> {
    let last_segment = url.path_segments()?.next_back()?;
    let (stem, ext) = last_segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
