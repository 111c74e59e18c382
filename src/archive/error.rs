//! Error types for archive extraction.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while extracting a fixture archive.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// An entry would land outside the destination directory ("zip slip").
    #[error("Archive entry {entry:?} resolves outside the destination: {}", resolved.display())]
    PathTraversal { entry: String, resolved: PathBuf },

    /// The archive itself is unreadable or malformed.
    #[error("Malformed archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A local filesystem operation failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExtractionError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_path_traversal(&self) -> bool {
        matches!(self, ExtractionError::PathTraversal { .. })
    }
}
