//! Raw-document archive: the object store trait and a local-directory backend.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

const HASH_PREFIX_LEN: usize = 12;

/// Errors raised while archiving raw documents.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// The local path has no file name component.
    #[error("cannot derive an object name from '{0}'")]
    InvalidPath(PathBuf),
    /// Reading the source or writing the object failed.
    #[error("object store I/O failed for '{path}': {source}")]
    Io {
        /// Path involved in the failing operation.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Durable archive for raw document bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `local_path`, returning the object name it was stored under.
    async fn upload(&self, local_path: &Path) -> Result<String, ObjectStoreError>;
}

/// Object store backed by a bucket directory on the local filesystem.
///
/// Objects are named `<sha256 prefix>-<basename>` so documents sharing a name never clobber
/// each other, and uploading identical bytes twice is a no-op overwrite.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    bucket_dir: PathBuf,
}

impl LocalObjectStore {
    /// Use `root/bucket` as the bucket directory. The directory is created on first upload.
    pub fn new(root: impl Into<PathBuf>, bucket: &str) -> Self {
        Self {
            bucket_dir: root.into().join(bucket),
        }
    }

    /// Directory objects are written into.
    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }
}

/// Object name for `bytes` uploaded from a file called `file_name`.
fn object_name(file_name: &str, bytes: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    format!("{}-{file_name}", &digest[..HASH_PREFIX_LEN])
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, local_path: &Path) -> Result<String, ObjectStoreError> {
        let file_name = local_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ObjectStoreError::InvalidPath(local_path.to_path_buf()))?;
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|source| ObjectStoreError::Io {
                path: local_path.to_path_buf(),
                source,
            })?;

        let name = object_name(file_name, &bytes);
        tokio::fs::create_dir_all(&self.bucket_dir)
            .await
            .map_err(|source| ObjectStoreError::Io {
                path: self.bucket_dir.clone(),
                source,
            })?;
        let target = self.bucket_dir.join(&name);
        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|source| ObjectStoreError::Io {
                path: target.clone(),
                source,
            })?;

        tracing::debug!(object = %name, bytes = bytes.len(), "Archived document");
        Ok(name)
    }
}
