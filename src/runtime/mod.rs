//! # Container Runtime
//!
//! The orchestrator and the image cache talk to the container daemon through the
//! [`RuntimeClient`] trait. Each operation is fallible on its own and receives a
//! [`RuntimeContext`] carrying the namespace and the fixture mount.
//!
//! ## Backends
//!
//! - [`DockerRuntime`]: the Docker Engine API over a local unix socket (`bollard`).
//! - [`mock::InMemoryRuntime`]: an in-process daemon for tests, with failure
//!   injection and a journal of every call.

mod docker;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ContainerName, FixtureDataset, ImageReference};

pub use docker::DockerRuntime;

/// Errors reported by a runtime backend for a single operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// The daemon could not be reached.
    #[error("Runtime unavailable: {0}")]
    Unavailable(String),

    /// The image is not present locally or in its registry.
    #[error("Image not found: {0}")]
    ImageNotFound(String),

    /// No container with this name exists.
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    /// The daemon refused the operation.
    #[error("Runtime rejected {operation}: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },
}

/// Ambient context passed through every runtime call.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    /// Namespace every container is created in (a label on Docker).
    pub namespace: String,
    /// Read-only dataset bind-mounted into each container.
    pub fixture: FixtureDataset,
    /// Mount point of the dataset inside the container.
    pub fixture_mount: String,
}

impl RuntimeContext {
    pub fn new(namespace: impl Into<String>, fixture: FixtureDataset, fixture_mount: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            fixture,
            fixture_mount: fixture_mount.into(),
        }
    }
}

/// Operations a container daemon must offer for one reader lifecycle.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Fetches the image into local storage. Pulling a cached image succeeds
    /// without doing anything.
    async fn pull_image(&self, ctx: &RuntimeContext, image: &ImageReference) -> Result<(), RuntimeError>;

    /// Creates a new container and returns its runtime-assigned name. Every call
    /// yields a distinct container.
    async fn create_container(
        &self,
        ctx: &RuntimeContext,
        image: &ImageReference,
    ) -> Result<ContainerName, RuntimeError>;

    async fn start_container(&self, ctx: &RuntimeContext, name: &ContainerName) -> Result<(), RuntimeError>;

    /// Signals the container to terminate. No grace period is enforced here.
    async fn stop_container(&self, ctx: &RuntimeContext, name: &ContainerName) -> Result<(), RuntimeError>;

    async fn delete_container(&self, ctx: &RuntimeContext, name: &ContainerName) -> Result<(), RuntimeError>;

    /// Removes the image from local storage.
    async fn evict_image(&self, ctx: &RuntimeContext, image: &ImageReference) -> Result<(), RuntimeError>;
}
