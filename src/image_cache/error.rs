//! Error types for the image cache actor.

use thiserror::Error;

use crate::model::LaunchStep;
use crate::runtime::RuntimeError;

/// Errors returned by [`ImageCacheClient`](super::ImageCacheClient) calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImageCacheError {
    /// The actor has shut down.
    #[error("Image cache closed")]
    ActorClosed,

    /// The actor dropped the response channel without answering.
    #[error("Image cache dropped response channel")]
    ActorDropped,

    /// A release for an image nobody holds a lease on.
    #[error("No lease held on image {0}")]
    NotLeased(String),

    /// Forced eviction of an image that running launches still hold.
    #[error("Image {image} is in use by {leases} launch(es)")]
    InUse { image: String, leases: u32 },

    /// The runtime failed while the cache pulled or evicted an image.
    #[error("Runtime {step} failed: {source}")]
    Runtime {
        step: LaunchStep,
        #[source]
        source: RuntimeError,
    },
}
