//! Moves finished documents into `processed/` or `error/` next to where they were found.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Terminal state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Every processing step succeeded.
    Processed,
    /// Some step failed.
    Failed,
}

impl Disposition {
    /// Name of the sibling directory documents with this disposition are moved into.
    pub fn directory_name(self) -> &'static str {
        match self {
            Disposition::Processed => "processed",
            Disposition::Failed => "error",
        }
    }
}

/// Errors raised while moving a document.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The path has no file name to keep.
    #[error("cannot route '{0}': no file name")]
    MissingFileName(PathBuf),
    /// Creating the target directory or renaming failed.
    #[error("failed to move document to '{path}': {source}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Directory a document at `path` is moved into for `disposition`.
pub fn terminal_directory(path: &Path, disposition: Disposition) -> PathBuf {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    parent.join(disposition.directory_name())
}

/// Move `path` into its terminal directory, keeping the base name. Returns the new path.
///
/// An existing file with the same name in the target directory is replaced.
pub async fn route_document(path: &Path, disposition: Disposition) -> Result<PathBuf, RouteError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| RouteError::MissingFileName(path.to_path_buf()))?;
    let directory = terminal_directory(path, disposition);
    tokio::fs::create_dir_all(&directory)
        .await
        .map_err(|source| RouteError::Io {
            path: directory.clone(),
            source,
        })?;

    let target = directory.join(file_name);
    tokio::fs::rename(path, &target)
        .await
        .map_err(|source| RouteError::Io {
            path: target.clone(),
            source,
        })?;
    Ok(target)
}
