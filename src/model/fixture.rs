use std::io;
use std::path::{Path, PathBuf};

/// Handle to a fully extracted fixture directory.
///
/// A `FixtureDataset` is only handed out once extraction has finished, which is
/// what lets every launch mount it without ever observing a partial tree.
/// The directory is treated as read-only from then on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureDataset {
    root: PathBuf,
}

impl FixtureDataset {
    /// Wraps an already extracted directory.
    ///
    /// The path is made absolute and must name an existing directory.
    pub fn from_extracted(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = std::path::absolute(root.as_ref())?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("fixture directory {} does not exist", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
