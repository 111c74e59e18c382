//! Error types for the reader lifecycle.

use thiserror::Error;

use crate::image_cache::ImageCacheError;
use crate::model::{ContainerName, LaunchStep};
use crate::runtime::RuntimeError;

/// A launch that stopped before completing its lifecycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LaunchError {
    /// A runtime operation failed; the remaining steps were skipped.
    #[error("Launch {request_id} failed at {step}: {source}")]
    Step {
        request_id: u64,
        step: LaunchStep,
        /// The container, when the failure happened after it was created.
        container: Option<ContainerName>,
        /// Steps that completed before the failure.
        completed: Vec<LaunchStep>,
        #[source]
        source: RuntimeError,
    },

    /// The image cache actor could not be reached.
    #[error("Launch {request_id} could not reach the image cache: {source}")]
    Cache {
        request_id: u64,
        #[source]
        source: ImageCacheError,
    },
}

impl LaunchError {
    pub(crate) fn from_cache(
        request_id: u64,
        container: Option<ContainerName>,
        completed: Vec<LaunchStep>,
        err: ImageCacheError,
    ) -> Self {
        match err {
            ImageCacheError::Runtime { step, source } => LaunchError::Step {
                request_id,
                step,
                container,
                completed,
                source,
            },
            source => LaunchError::Cache { request_id, source },
        }
    }

    pub fn request_id(&self) -> u64 {
        match self {
            LaunchError::Step { request_id, .. } | LaunchError::Cache { request_id, .. } => *request_id,
        }
    }

    /// The step that failed, if a runtime step failed.
    pub fn step(&self) -> Option<LaunchStep> {
        match self {
            LaunchError::Step { step, .. } => Some(*step),
            LaunchError::Cache { .. } => None,
        }
    }

    pub fn container(&self) -> Option<&ContainerName> {
        match self {
            LaunchError::Step { container, .. } => container.as_ref(),
            LaunchError::Cache { .. } => None,
        }
    }
}
