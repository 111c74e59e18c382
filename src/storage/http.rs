use super::{ObjectStore, StorageError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Fetches `http(s)://` URLs verbatim, for public or pre-signed objects.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
}

impl HttpObjectStore {
    pub fn new() -> Result<Self, StorageError> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    pub(crate) fn url_for(path: &str) -> Result<&str, StorageError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            Ok(path)
        } else {
            Err(StorageError::InvalidPath(path.to_string()))
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn download_object(
        &self,
        path: &str,
        destination: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, StorageError> {
        let url = Self::url_for(path)?;
        debug!(%url, "Downloading object");

        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(path.to_string()));
        }
        let mut response = response.error_for_status()?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            destination.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        destination.flush().await?;
        Ok(written)
    }
}
