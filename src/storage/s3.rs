use super::{ObjectStore, StorageError};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Fetches `s3://bucket/key` objects with the AWS SDK.
///
/// Credentials come from the default provider chain (environment, shared
/// profile, web identity, instance metadata); the region is fixed at
/// construction.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub async fn from_env(region: &str) -> Result<Self, StorageError> {
        let region = region.trim();
        if region.is_empty() {
            return Err(StorageError::Backend("storage region is empty".to_string()));
        }
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Ok(Self::with_client(Client::new(&config)))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// Splits `s3://bucket/key` into its bucket and key.
pub(crate) fn split_s3_path(path: &str) -> Result<(&str, &str), StorageError> {
    let invalid = || StorageError::InvalidPath(path.to_string());
    let rest = path.strip_prefix("s3://").ok_or_else(invalid)?;
    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok((bucket, key)),
        _ => Err(invalid()),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn download_object(
        &self,
        path: &str,
        destination: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, StorageError> {
        let (bucket, key) = split_s3_path(path)?;
        debug!(bucket, key, "Downloading object");

        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(err) if err.is_no_such_key() => StorageError::NotFound(path.to_string()),
                _ => StorageError::Backend(DisplayErrorContext(&e).to_string()),
            })?;

        let mut body = output.body;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StorageError::Backend(e.to_string()))?;
            destination.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        destination.flush().await?;
        Ok(written)
    }
}
