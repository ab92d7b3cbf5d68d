//! Temporary storage bridge between object storage and the extractors.
//!
//! Blobs referenced by URL are downloaded into a transient local file so
//! extraction can work from a request-scoped copy. Deletion of the local
//! copy is guaranteed on every exit path by [`LocalDocument`]'s `Drop`;
//! cleanup failures are logged and never mask the request outcome.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to download `{url}`: {details}")]
    DownloadFailed { url: String, details: String },
    #[error("failed to stage blob locally: {source}")]
    Stage {
        #[source]
        source: std::io::Error,
    },
}

/// A downloaded blob staged at a transient local path. The file is removed
/// when the value drops, whichever way the request ends.
#[derive(Debug)]
pub struct LocalDocument {
    path: Option<TempPath>,
    size_bytes: u64,
}

impl LocalDocument {
    pub fn path(&self) -> &Path {
        self.path
            .as_deref()
            .expect("temp path is present until drop")
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

impl Drop for LocalDocument {
    fn drop(&mut self) {
        if let Some(path) = self.path.take()
            && let Err(error) = path.close()
        {
            tracing::warn!(%error, "failed to remove temporary document");
        }
    }
}

#[derive(Debug, Clone)]
pub struct TempStorageBridge {
    client: reqwest::Client,
    scratch_dir: PathBuf,
}

impl TempStorageBridge {
    pub fn new(scratch_dir: Option<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            scratch_dir: scratch_dir.unwrap_or_else(std::env::temp_dir),
        }
    }

    /// Download the blob behind `url` into a fresh temp file under the
    /// scratch directory and hand ownership of the local copy to the caller.
    pub async fn download_to_local(&self, url: &str) -> Result<LocalDocument, StorageError> {
        let response = self.client.get(url).send().await.map_err(|error| {
            StorageError::DownloadFailed {
                url: url.to_string(),
                details: error.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::DownloadFailed {
                url: url.to_string(),
                details: format!("status {status}"),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|error| StorageError::DownloadFailed {
                url: url.to_string(),
                details: error.to_string(),
            })?;

        let size_bytes = bytes.len() as u64;
        let scratch_dir = self.scratch_dir.clone();
        let temp_path = tokio::task::spawn_blocking(move || -> std::io::Result<TempPath> {
            std::fs::create_dir_all(&scratch_dir)?;
            let mut file = tempfile::NamedTempFile::new_in(&scratch_dir)?;
            file.write_all(&bytes)?;
            file.flush()?;
            Ok(file.into_temp_path())
        })
        .await
        .map_err(|error| StorageError::Stage {
            source: std::io::Error::other(error),
        })?
        .map_err(|source| StorageError::Stage { source })?;

        tracing::debug!(size_bytes, "staged remote blob locally");

        Ok(LocalDocument {
            path: Some(temp_path),
            size_bytes,
        })
    }

    pub async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    pub async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        tokio::fs::read(path)
            .await
            .map_err(|source| StorageError::Stage { source })
    }
}
