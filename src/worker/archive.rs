//! Zip archive assembly for a task's downloaded files

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::tasks::FileEntry;

/// File name of the archive produced for every task.
pub const ARCHIVE_FILE_NAME: &str = "archive.zip";

/// Failures that leave no usable archive behind.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to create archive {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to finalize archive {path}: {source}")]
    Finalize {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

/// A single file that could not be added. The archive itself is still valid.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("failed to open '{name}': {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read metadata of '{name}': {source}")]
    Metadata {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("'{0}' is not a regular file")]
    NotAFile(String),

    #[error("failed to add '{name}' to archive: {source}")]
    Header {
        name: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to write '{name}' into archive: {source}")]
    Copy {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Outcome of a completed archive run.
#[derive(Debug)]
pub struct ArchiveReport {
    /// Input entries, with the ones that failed inclusion flagged as errors.
    pub files: Vec<FileEntry>,
    pub errors: Vec<EntryError>,
    pub archived: usize,
}

/// Writes every Ready entry of `files` (read from `base_dir`) into a zip at
/// `dest`, in the order given.
///
/// A file that cannot be included is flagged on its entry and recorded in
/// the report; the remaining files are still attempted. Only failing to
/// create or finalize the archive file is returned as an error.
///
/// Blocking; run it on the blocking pool.
pub fn write_archive(
    mut files: Vec<FileEntry>,
    base_dir: &Path,
    dest: &Path,
) -> Result<ArchiveReport, ArchiveError> {
    let out = File::create(dest).map_err(|source| ArchiveError::Create {
        path: dest.to_path_buf(),
        source,
    })?;
    let mut zip = ZipWriter::new(BufWriter::new(out));

    let mut errors = Vec::new();
    let mut archived = 0;

    for entry in files.iter_mut().filter(|entry| entry.is_ready()) {
        let Some(name) = entry.local_name.clone() else {
            continue;
        };

        match add_file(&mut zip, &base_dir.join(&name), &name) {
            Ok(size) => {
                archived += 1;
                debug!(file = %name, size, "Added file to archive");
            }
            Err(err) => {
                warn!(archive = %dest.display(), error = %err, "Skipping file");
                entry.mark_failed(err.to_string());
                errors.push(err);
            }
        }
    }

    let mut writer = zip.finish().map_err(|source| ArchiveError::Finalize {
        path: dest.to_path_buf(),
        source,
    })?;
    io::Write::flush(&mut writer).map_err(|source| ArchiveError::Finalize {
        path: dest.to_path_buf(),
        source: source.into(),
    })?;

    Ok(ArchiveReport {
        files,
        errors,
        archived,
    })
}

fn add_file<W>(zip: &mut ZipWriter<W>, path: &Path, name: &str) -> Result<u64, EntryError>
where
    W: io::Write + io::Seek,
{
    let mut file = File::open(path).map_err(|source| EntryError::Open {
        name: name.to_string(),
        source,
    })?;

    let metadata = file.metadata().map_err(|source| EntryError::Metadata {
        name: name.to_string(),
        source,
    })?;
    if !metadata.is_file() {
        return Err(EntryError::NotAFile(name.to_string()));
    }

    let mut options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(metadata.len() >= u64::from(u32::MAX));
    if let Some(modified) = metadata
        .modified()
        .ok()
        .and_then(|mtime| zip::DateTime::try_from(OffsetDateTime::from(mtime)).ok())
    {
        options = options.last_modified_time(modified);
    }

    zip.start_file(name, options)
        .map_err(|source| EntryError::Header {
            name: name.to_string(),
            source,
        })?;

    io::copy(&mut file, zip).map_err(|source| EntryError::Copy {
        name: name.to_string(),
        source,
    })
}

/// Creates `<root>/<task_id>` if needed and returns the archive path inside it.
pub fn prepare_destination(root: &Path, task_dir: &str) -> io::Result<PathBuf> {
    let dir = root.join(task_dir);
    fs::create_dir_all(&dir)?;
    Ok(dir.join(ARCHIVE_FILE_NAME))
}
