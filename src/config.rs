//! # Configuration
//!
//! Every value the daemon used to hard-code lives in [`DaftletConfig`]. It is
//! built once at startup and handed to the provisioner, the runtime backend and
//! the orchestrator at construction time.
//!
//! Loading order: defaults, then an optional TOML file (named by `DAFTLET_CONFIG`
//! in the binary), then `DAFTLET_*` environment overrides.
//!
//! ```toml
//! image_reference = "registry.example.com/daft/reader:0"
//! runtime_socket_path = "/var/run/docker.sock"
//! fixture_archive_remote_path = "s3://bucket/fixtures.zip"
//! local_fixture_directory = "/tmp/images"
//! evict_after_launch = true
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::model::ImageReference;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaftletConfig {
    /// Image launched for every reader session.
    pub image_reference: String,
    /// Unix socket of the container runtime daemon.
    pub runtime_socket_path: PathBuf,
    /// Namespace label attached to every container this daemon creates.
    pub runtime_namespace: String,
    /// Location of the fixture archive (`s3://`, `http(s)://`, `file://` or a plain path).
    pub fixture_archive_remote_path: String,
    /// Where the downloaded archive is written.
    pub local_archive_path: PathBuf,
    /// Where the archive is extracted.
    pub local_fixture_directory: PathBuf,
    /// Mount point of the fixture directory inside each reader container.
    pub container_fixture_mount: String,
    pub listen_addr: SocketAddr,
    /// Region of the S3 bucket holding the fixture archive.
    pub storage_region: String,
    /// Evict the image when the last concurrent launch using it finishes.
    pub evict_after_launch: bool,
    /// Delete the container of a launch whose start step failed.
    pub cleanup_on_failure: bool,
    /// Answer `400` to any body that is not exactly `{"id": <u64>}` instead of
    /// launching with id 0.
    pub reject_malformed_requests: bool,
    /// Run one launch (id 0) after provisioning, before serving.
    pub launch_on_startup: bool,
}

impl Default for DaftletConfig {
    fn default() -> Self {
        Self {
            image_reference: "941892620273.dkr.ecr.us-west-2.amazonaws.com/daft/reader:0".to_string(),
            runtime_socket_path: PathBuf::from("/var/run/docker.sock"),
            runtime_namespace: "reader".to_string(),
            fixture_archive_remote_path:
                "s3://eventual-data-test-bucket/test-rickroll/rickroll-images.zip".to_string(),
            local_archive_path: PathBuf::from("/tmp/images.zip"),
            local_fixture_directory: PathBuf::from("/tmp/images"),
            container_fixture_mount: "/run/eventual/fixtures".to_string(),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            storage_region: "us-west-2".to_string(),
            evict_after_launch: true,
            cleanup_on_failure: true,
            reject_malformed_requests: false,
            launch_on_startup: true,
        }
    }
}

impl DaftletConfig {
    /// Loads a TOML config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Applies `DAFTLET_*` environment overrides on top of `self`.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Same as [`with_env_overrides`](Self::with_env_overrides) with an injectable lookup.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("DAFTLET_IMAGE_REFERENCE") {
            self.image_reference = v;
        }
        if let Some(v) = lookup("DAFTLET_RUNTIME_SOCKET_PATH") {
            self.runtime_socket_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DAFTLET_RUNTIME_NAMESPACE") {
            self.runtime_namespace = v;
        }
        if let Some(v) = lookup("DAFTLET_FIXTURE_ARCHIVE_REMOTE_PATH") {
            self.fixture_archive_remote_path = v;
        }
        if let Some(v) = lookup("DAFTLET_LOCAL_ARCHIVE_PATH") {
            self.local_archive_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DAFTLET_LOCAL_FIXTURE_DIRECTORY") {
            self.local_fixture_directory = PathBuf::from(v);
        }
        if let Some(v) = lookup("DAFTLET_CONTAINER_FIXTURE_MOUNT") {
            self.container_fixture_mount = v;
        }
        if let Some(v) = lookup("DAFTLET_LISTEN_ADDR") {
            self.listen_addr = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "DAFTLET_LISTEN_ADDR",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("DAFTLET_STORAGE_REGION") {
            self.storage_region = v;
        }
        if let Some(v) = lookup("DAFTLET_EVICT_AFTER_LAUNCH") {
            self.evict_after_launch = parse_flag("DAFTLET_EVICT_AFTER_LAUNCH", &v)?;
        }
        if let Some(v) = lookup("DAFTLET_CLEANUP_ON_FAILURE") {
            self.cleanup_on_failure = parse_flag("DAFTLET_CLEANUP_ON_FAILURE", &v)?;
        }
        if let Some(v) = lookup("DAFTLET_REJECT_MALFORMED_REQUESTS") {
            self.reject_malformed_requests = parse_flag("DAFTLET_REJECT_MALFORMED_REQUESTS", &v)?;
        }
        if let Some(v) = lookup("DAFTLET_LAUNCH_ON_STARTUP") {
            self.launch_on_startup = parse_flag("DAFTLET_LAUNCH_ON_STARTUP", &v)?;
        }
        Ok(self)
    }

    /// Rejects settings that would leave the daemon unable to do anything useful.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image_reference.trim().is_empty() {
            return Err(ConfigError::Missing("image_reference"));
        }
        if self.runtime_namespace.trim().is_empty() {
            return Err(ConfigError::Missing("runtime_namespace"));
        }
        if self.fixture_archive_remote_path.trim().is_empty() {
            return Err(ConfigError::Missing("fixture_archive_remote_path"));
        }
        if self.local_fixture_directory.as_os_str().is_empty() {
            return Err(ConfigError::Missing("local_fixture_directory"));
        }
        Ok(())
    }

    pub fn image(&self) -> ImageReference {
        ImageReference::new(self.image_reference.clone())
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}
