//! Storage backend abstraction.
//!
//! A single backend (local filesystem, S3, or Azure Blob) is selected from
//! configuration at process start and stays fixed for the process lifetime.
//! All backends address objects by the normalized storage path produced by
//! [`path::storage_path_for`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

pub mod factory;
pub mod local;
pub mod path;

#[cfg(feature = "s3")]
pub mod s3;

#[cfg(feature = "azure")]
pub mod azure;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Storage path does not match the `documents/<id>/<filename>` shape.
    #[error("Malformed storage path: {path}")]
    MalformedPath { path: String },

    /// Backing object is absent. The reconciler treats this as the trigger
    /// for record self-healing.
    #[error("Storage object not found: {path}")]
    NotFound { path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// A file resolved from storage.
///
/// For the local backend this borrows the object in place. For remote
/// backends the object is downloaded into a scratch directory owned by this
/// value; dropping it removes the scratch copy.
#[derive(Debug)]
pub struct RetrievedFile {
    path: PathBuf,
    _scratch: Option<TempDir>,
}

impl RetrievedFile {
    pub fn local(path: PathBuf) -> Self {
        Self {
            path,
            _scratch: None,
        }
    }

    pub fn scratch(path: PathBuf, dir: TempDir) -> Self {
        Self {
            path,
            _scratch: Some(dir),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Copy the file at `source` into storage under a fresh collision-resistant
    /// name for `document_id`. Returns the backend-relative storage path to
    /// persist on the document record. On failure the source file is left
    /// untouched so the caller can retry.
    async fn store(
        &self,
        source: &Path,
        document_id: Uuid,
        logical_name: &str,
    ) -> Result<String, StorageError>;

    /// Resolve a stored path to a local file. Missing objects are
    /// [`StorageError::NotFound`] — the single most consequential error in the
    /// system, since every conversion depends on it.
    async fn retrieve(&self, stored_path: &str) -> Result<RetrievedFile, StorageError>;

    /// Best-effort delete. Returns whether an object was actually removed;
    /// "already absent" is `false`, never an error.
    async fn remove(&self, stored_path: &str) -> Result<bool, StorageError>;

    async fn exists(&self, stored_path: &str) -> Result<bool, StorageError>;

    fn backend_type(&self) -> &'static str;

    /// Create directories / validate access before the server starts serving.
    async fn initialize(&self) -> Result<(), StorageError>;
}
