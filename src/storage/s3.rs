//! S3 storage backend. Objects are keyed by the normalized storage path,
//! so a bucket listing mirrors the local layout (`documents/<id>/<name>`).

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use super::path;
use super::{RetrievedFile, StorageBackend, StorageError};
use crate::config::S3Config;

pub struct S3StorageBackend {
    client: Client,
    bucket_name: String,
}

impl S3StorageBackend {
    pub async fn new(config: &S3Config) -> Result<Self, StorageError> {
        if config.bucket_name.is_empty() {
            return Err(StorageError::Backend("Bucket name is required".to_string()));
        }
        if config.access_key_id.is_empty() || config.secret_access_key.is_empty() {
            return Err(StorageError::Backend(
                "S3 credentials are required".to_string(),
            ));
        }

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "docuvault-s3",
        );

        let mut builder = aws_sdk_s3::config::Builder::new()
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .behavior_version_latest();

        // Custom endpoint for S3-compatible services (MinIO etc.)
        if let Some(endpoint_url) = &config.endpoint_url {
            if !endpoint_url.is_empty() {
                builder = builder.endpoint_url(endpoint_url).force_path_style(true);
                info!("Using custom S3 endpoint: {}", endpoint_url);
            }
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket_name: config.bucket_name.clone(),
        })
    }

    async fn head(&self, key: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(StorageError::Backend(format!(
                        "S3 head_object failed for {}: {}",
                        key, service_err
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl StorageBackend for S3StorageBackend {
    async fn store(
        &self,
        source: &Path,
        document_id: Uuid,
        logical_name: &str,
    ) -> Result<String, StorageError> {
        let stored_path = path::storage_path_for(document_id, logical_name);
        path::parse(&stored_path)?;

        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to read {}: {}", source.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&stored_path)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                StorageError::Backend(format!("S3 upload failed for {}: {}", stored_path, e))
            })?;

        info!("Stored object in s3://{}/{}", self.bucket_name, stored_path);
        Ok(stored_path)
    }

    async fn retrieve(&self, stored_path: &str) -> Result<RetrievedFile, StorageError> {
        let parsed = path::parse(stored_path)?;
        let key = path::normalize(stored_path);

        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    return Err(StorageError::NotFound {
                        path: stored_path.to_string(),
                    });
                }
                return Err(StorageError::Backend(format!(
                    "S3 download failed for {}: {}",
                    key, service_err
                )));
            }
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(format!("S3 body read failed for {}: {}", key, e)))?
            .into_bytes();

        let scratch = tempfile::tempdir()?;
        let local_path = scratch.path().join(&parsed.filename);
        tokio::fs::write(&local_path, &data).await?;

        debug!("Downloaded s3://{}/{} to scratch", self.bucket_name, key);
        Ok(RetrievedFile::scratch(local_path, scratch))
    }

    async fn remove(&self, stored_path: &str) -> Result<bool, StorageError> {
        path::parse(stored_path)?;
        let key = path::normalize(stored_path);

        // DeleteObject succeeds on absent keys, so check first to report
        // whether anything was actually removed
        if !self.head(&key).await? {
            return Ok(false);
        }

        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                StorageError::Backend(format!("S3 delete failed for {}: {}", key, e))
            })?;

        debug!("Removed s3://{}/{}", self.bucket_name, key);
        Ok(true)
    }

    async fn exists(&self, stored_path: &str) -> Result<bool, StorageError> {
        path::parse(stored_path)?;
        self.head(&path::normalize(stored_path)).await
    }

    fn backend_type(&self) -> &'static str {
        "s3"
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
            .map_err(|e| {
                StorageError::Backend(format!(
                    "Cannot access S3 bucket {}: {}",
                    self.bucket_name, e
                ))
            })?;
        info!("Verified access to S3 bucket {}", self.bucket_name);
        Ok(())
    }
}
