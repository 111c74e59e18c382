//! Object storage backends used to fetch the fixture archive.
//!
//! The provisioner only depends on the [`ObjectStore`] trait. Three backends ship
//! with the daemon: [`S3ObjectStore`] for `s3://` objects (AWS SDK, ambient
//! credentials), [`HttpObjectStore`] for `http(s)://` URLs, and
//! [`LocalObjectStore`] for plain paths and `file://` URLs.

mod http;
mod local;
mod s3;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWrite;

pub use http::HttpObjectStore;
pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

/// Failure while fetching an object (the download error of the provisioning step).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Streams the object at `path` into `destination` and returns the byte count.
    async fn download_object(
        &self,
        path: &str,
        destination: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, StorageError>;
}

/// Picks a backend from the scheme of `remote_path`.
pub async fn object_store_for(remote_path: &str, region: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
    let store: Arc<dyn ObjectStore> = if remote_path.starts_with("s3://") {
        Arc::new(S3ObjectStore::from_env(region).await?)
    } else if remote_path.starts_with("http://") || remote_path.starts_with("https://") {
        Arc::new(HttpObjectStore::new()?)
    } else {
        Arc::new(LocalObjectStore::new(PathBuf::from("."))?)
    };
    Ok(store)
}
