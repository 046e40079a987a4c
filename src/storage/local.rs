//! Local filesystem storage backend.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use super::path::{self, StoragePath};
use super::{RetrievedFile, StorageBackend, StorageError};

pub struct LocalStorageBackend {
    base_path: PathBuf,
}

impl LocalStorageBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Map a parsed storage path onto the filesystem:
    /// `<base>/documents/<id>/<filename>`.
    fn system_path(&self, parsed: &StoragePath) -> PathBuf {
        self.base_path
            .join("documents")
            .join(&parsed.document_id)
            .join(&parsed.filename)
    }
}

#[async_trait]
impl StorageBackend for LocalStorageBackend {
    async fn store(
        &self,
        source: &Path,
        document_id: Uuid,
        logical_name: &str,
    ) -> Result<String, StorageError> {
        let stored_path = path::storage_path_for(document_id, logical_name);
        let parsed = path::parse(&stored_path)?;
        let dest = self.system_path(&parsed);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        // copy, not rename: the caller keeps its temp file on failure
        fs::copy(source, &dest).await?;

        info!("Stored object locally: {}", dest.display());
        Ok(stored_path)
    }

    async fn retrieve(&self, stored_path: &str) -> Result<RetrievedFile, StorageError> {
        let parsed = path::parse(stored_path)?;
        let full = self.system_path(&parsed);

        match fs::metadata(&full).await {
            Ok(_) => Ok(RetrievedFile::local(full)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                path: stored_path.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, stored_path: &str) -> Result<bool, StorageError> {
        let parsed = path::parse(stored_path)?;
        let full = self.system_path(&parsed);

        match fs::remove_file(&full).await {
            Ok(()) => {
                debug!("Removed object: {}", full.display());
                // the per-document directory is empty now; leaving it behind
                // is harmless, so only try once and ignore the result
                if let Some(parent) = full.parent() {
                    let _ = fs::remove_dir(parent).await;
                }
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, stored_path: &str) -> Result<bool, StorageError> {
        let parsed = path::parse(stored_path)?;
        Ok(fs::metadata(self.system_path(&parsed)).await.is_ok())
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        let documents_dir = self.base_path.join("documents");
        fs::create_dir_all(&documents_dir).await?;
        info!("Ensured storage directory exists: {}", documents_dir.display());
        Ok(())
    }
}
