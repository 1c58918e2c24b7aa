//! S3 object store wrapper.
//!
//! Uploads and downloads go through the filesystem (`ByteStream::from_path`
//! / async read into a file) so multi-megabyte media never sits in
//! memory.

pub mod keys;

use std::path::Path;

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

/// Errors from the object store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 request failed: {0}")]
    Request(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// S3 connection settings.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, localstack).
    pub endpoint_url: Option<String>,
    /// Path-style addressing, required by most S3-compatible stores.
    pub path_style: bool,
}

impl S3Config {
    /// Load from `S3_BUCKET` / `AWS_REGION` / `S3_ENDPOINT_URL` /
    /// `S3_PATH_STYLE`.
    ///
    /// # Panics
    ///
    /// Panics if `S3_BUCKET` is missing -- there is nowhere to put
    /// artifacts without it.
    pub fn from_env() -> Self {
        Self {
            bucket: std::env::var("S3_BUCKET").expect("S3_BUCKET must be set in the environment"),
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".into()),
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok(),
            path_style: std::env::var("S3_PATH_STYLE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

/// Blob storage seam the pipeline is wired against.
///
/// [`ObjectStore`] is the S3 implementation; tests inject in-memory
/// doubles.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a local file to `key`.
    async fn upload_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Download `key` into a local file.
    async fn download_to(&self, key: &str, path: &Path) -> Result<(), StorageError>;

    /// Whether an object exists at `key`.
    async fn head(&self, key: &str) -> Result<bool, StorageError>;

    /// Delete `key`. Missing objects are not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Handle to the artifact bucket. Cheap to clone.
#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
    bucket: String,
}

impl ObjectStore {
    /// Build a store from config, loading AWS credentials from the
    /// environment.
    pub async fn connect(config: S3Config) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
        }
    }

    /// Wrap an existing client (tests).
    pub fn with_client(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Verify the bucket is reachable.
    pub async fn health_check(&self) -> Result<(), StorageError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;
        Ok(())
    }

}

#[async_trait::async_trait]
impl BlobStore for ObjectStore {
    /// Upload a local file to `key`, streaming from disk.
    async fn upload_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::Request(format!("Failed to open {path:?}: {e}")))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Request(format!("PutObject {key} failed: {e}")))?;

        tracing::debug!(key, content_type, "Uploaded object");
        Ok(())
    }

    /// Download `key` into a local file, streaming to disk.
    async fn download_to(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Request(format!("GetObject {key} failed: {e}")))?;

        let mut reader = response.body.into_async_read();
        let mut file = tokio::fs::File::create(path).await?;
        tokio::io::copy(&mut reader, &mut file).await?;
        tokio::io::AsyncWriteExt::flush(&mut file).await?;

        tracing::debug!(key, ?path, "Downloaded object");
        Ok(())
    }

    /// Whether an object exists at `key`, via HeadObject.
    async fn head(&self, key: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
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
                    Err(StorageError::Request(format!(
                        "HeadObject {key} failed: {service_err}"
                    )))
                }
            }
        }
    }

    /// Delete `key`. Missing objects are not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Request(format!("DeleteObject {key} failed: {e}")))?;

        tracing::debug!(key, "Deleted object");
        Ok(())
    }
}
