use super::{ObjectStore, StorageError};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Serves objects straight from the local filesystem.
///
/// Relative object paths are resolved against `root`; absolute paths and
/// `file://` URLs are used as-is.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf) -> Result<Self, StorageError> {
        if root.as_os_str().is_empty() {
            return Err(StorageError::Backend("storage root is empty".to_string()));
        }
        Ok(Self { root })
    }

    fn object_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        let path = path.strip_prefix("file://").unwrap_or(path);
        if path.trim().is_empty() {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn download_object(
        &self,
        path: &str,
        destination: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, StorageError> {
        let source = self.object_path(path)?;
        let mut file = match tokio::fs::File::open(&source).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(source.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let written = tokio::io::copy(&mut file, &mut *destination).await?;
        destination.flush().await?;
        Ok(written)
    }
}
