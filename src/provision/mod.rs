//! # Fixture Provisioning
//!
//! Runs once at startup: download the fixture archive, unpack it, and hand back
//! a [`FixtureDataset`]. Any error here is fatal to the process; the HTTP
//! surface is only started with a dataset in hand.

mod error;

pub use error::*;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

use crate::archive;
use crate::config::DaftletConfig;
use crate::model::FixtureDataset;
use crate::storage::ObjectStore;

pub struct FixtureProvisioner {
    store: Arc<dyn ObjectStore>,
    remote_archive_path: String,
    local_archive_path: PathBuf,
    fixture_directory: PathBuf,
}

impl FixtureProvisioner {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        remote_archive_path: impl Into<String>,
        local_archive_path: impl Into<PathBuf>,
        fixture_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            remote_archive_path: remote_archive_path.into(),
            local_archive_path: local_archive_path.into(),
            fixture_directory: fixture_directory.into(),
        }
    }

    pub fn from_config(store: Arc<dyn ObjectStore>, config: &DaftletConfig) -> Self {
        Self::new(
            store,
            config.fixture_archive_remote_path.clone(),
            config.local_archive_path.clone(),
            config.local_fixture_directory.clone(),
        )
    }

    /// Downloads the archive to the local archive path, then extracts it into
    /// the fixture directory.
    #[instrument(skip(self), fields(remote = %self.remote_archive_path))]
    pub async fn provision(&self) -> Result<FixtureDataset, ProvisionError> {
        let bytes = self.download().await?;
        info!(bytes, archive = %self.local_archive_path.display(), "Fixture archive downloaded");

        let source = self.local_archive_path.clone();
        let destination = self.fixture_directory.clone();
        let summary = tokio::task::spawn_blocking(move || archive::extract(&source, &destination))
            .await
            .map_err(|e| ProvisionError::Worker(e.to_string()))??;

        let dataset = FixtureDataset::from_extracted(&self.fixture_directory)
            .map_err(|source| io_error(&self.fixture_directory, source))?;
        info!(
            files = summary.files,
            root = %dataset.root().display(),
            "Fixture dataset ready"
        );
        Ok(dataset)
    }

    async fn download(&self) -> Result<u64, ProvisionError> {
        let path = &self.local_archive_path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|source| io_error(path, source))?;
        let bytes = self
            .store
            .download_object(&self.remote_archive_path, &mut file)
            .await?;
        file.flush().await.map_err(|source| io_error(path, source))?;
        file.sync_all().await.map_err(|source| io_error(path, source))?;
        Ok(bytes)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ProvisionError {
    ProvisionError::Io {
        path: path.to_path_buf(),
        source,
    }
}
