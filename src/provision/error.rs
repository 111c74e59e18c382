//! Error types for fixture provisioning.

use std::path::PathBuf;
use thiserror::Error;

use crate::archive::ExtractionError;
use crate::storage::StorageError;

/// Errors that abort startup provisioning.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The archive could not be fetched from object storage.
    #[error("Download failed: {0}")]
    Download(#[from] StorageError),

    /// The archive was fetched but could not be unpacked.
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// Preparing the local archive file failed.
    #[error("Local I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocking extraction worker panicked or was cancelled.
    #[error("Extraction worker failed: {0}")]
    Worker(String),
}
