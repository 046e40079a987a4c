//! Factory selecting the storage backend from configuration. The selection
//! happens once at startup and is immutable for the process lifetime.

use anyhow::Result;
use std::sync::Arc;

use super::local::LocalStorageBackend;
use super::StorageBackend;
use crate::config::{Config, StorageBackendKind};

pub async fn create_storage_backend(config: &Config) -> Result<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config.storage_backend {
        StorageBackendKind::Local => {
            Arc::new(LocalStorageBackend::new(config.local_storage_path.clone()))
        }
        #[cfg(feature = "s3")]
        StorageBackendKind::S3 => {
            let s3_config = config
                .s3_config
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("S3 backend selected but not configured"))?;
            Arc::new(super::s3::S3StorageBackend::new(s3_config).await?)
        }
        #[cfg(not(feature = "s3"))]
        StorageBackendKind::S3 => {
            anyhow::bail!("S3 backend requested but the 's3' feature is not compiled in")
        }
        #[cfg(feature = "azure")]
        StorageBackendKind::Azure => {
            let azure_config = config
                .azure_config
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Azure backend selected but not configured"))?;
            Arc::new(super::azure::AzureStorageBackend::new(azure_config)?)
        }
        #[cfg(not(feature = "azure"))]
        StorageBackendKind::Azure => {
            anyhow::bail!("Azure backend requested but the 'azure' feature is not compiled in")
        }
    };

    backend.initialize().await?;
    tracing::info!("Using {} storage backend", backend.backend_type());
    Ok(backend)
}
