//! Azure Blob Storage backend, mirroring the S3 backend's shape. Blobs are
//! named by the normalized storage path.

use async_trait::async_trait;
use azure_storage::StorageCredentials;
use azure_storage_blobs::prelude::{BlobServiceClient, ContainerClient};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use super::path;
use super::{RetrievedFile, StorageBackend, StorageError};
use crate::config::AzureConfig;

pub struct AzureStorageBackend {
    container: ContainerClient,
    container_name: String,
}

impl AzureStorageBackend {
    pub fn new(config: &AzureConfig) -> Result<Self, StorageError> {
        if config.account.is_empty() || config.access_key.is_empty() {
            return Err(StorageError::Backend(
                "Azure storage account and access key are required".to_string(),
            ));
        }

        let credentials =
            StorageCredentials::access_key(config.account.clone(), config.access_key.clone());
        let service = BlobServiceClient::new(config.account.clone(), credentials);

        Ok(Self {
            container: service.container_client(&config.container_name),
            container_name: config.container_name.clone(),
        })
    }

    fn classify(err: azure_core::Error, path: &str) -> StorageError {
        if let Some(http_err) = err.as_http_error() {
            if http_err.status() == azure_core::StatusCode::NotFound {
                return StorageError::NotFound {
                    path: path.to_string(),
                };
            }
        }
        StorageError::Backend(format!("Azure blob operation failed for {}: {}", path, err))
    }
}

#[async_trait]
impl StorageBackend for AzureStorageBackend {
    async fn store(
        &self,
        source: &Path,
        document_id: Uuid,
        logical_name: &str,
    ) -> Result<String, StorageError> {
        let stored_path = path::storage_path_for(document_id, logical_name);
        path::parse(&stored_path)?;

        let data = tokio::fs::read(source).await?;
        self.container
            .blob_client(&stored_path)
            .put_block_blob(data)
            .await
            .map_err(|e| Self::classify(e, &stored_path))?;

        info!(
            "Stored object in azure container {} as {}",
            self.container_name, stored_path
        );
        Ok(stored_path)
    }

    async fn retrieve(&self, stored_path: &str) -> Result<RetrievedFile, StorageError> {
        let parsed = path::parse(stored_path)?;
        let blob_name = path::normalize(stored_path);

        let data = self
            .container
            .blob_client(&blob_name)
            .get_content()
            .await
            .map_err(|e| Self::classify(e, stored_path))?;

        let scratch = tempfile::tempdir()?;
        let local_path = scratch.path().join(&parsed.filename);
        tokio::fs::write(&local_path, &data).await?;

        debug!("Downloaded azure blob {} to scratch", blob_name);
        Ok(RetrievedFile::scratch(local_path, scratch))
    }

    async fn remove(&self, stored_path: &str) -> Result<bool, StorageError> {
        path::parse(stored_path)?;
        let blob_name = path::normalize(stored_path);

        match self.container.blob_client(&blob_name).delete().await {
            Ok(_) => {
                debug!("Removed azure blob {}", blob_name);
                Ok(true)
            }
            Err(e) => match Self::classify(e, stored_path) {
                StorageError::NotFound { .. } => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn exists(&self, stored_path: &str) -> Result<bool, StorageError> {
        path::parse(stored_path)?;
        let blob_name = path::normalize(stored_path);

        self.container
            .blob_client(&blob_name)
            .exists()
            .await
            .map_err(|e| Self::classify(e, stored_path))
    }

    fn backend_type(&self) -> &'static str {
        "azure"
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        let exists = self
            .container
            .exists()
            .await
            .map_err(|e| Self::classify(e, &self.container_name))?;
        if !exists {
            self.container
                .create()
                .await
                .map_err(|e| Self::classify(e, &self.container_name))?;
            info!("Created azure container {}", self.container_name);
        } else {
            info!("Verified access to azure container {}", self.container_name);
        }
        Ok(())
    }
}
