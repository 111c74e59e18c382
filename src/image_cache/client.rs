use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, warn};

use super::{CacheRequest, CachedImage, ImageCacheError, ImageLease};
use crate::model::{EvictionOutcome, ImageReference};

/// Cloneable handle to the image cache actor.
///
/// Dropping every clone closes the channel and lets the actor shut down.
#[derive(Clone)]
pub struct ImageCacheClient {
    sender: mpsc::Sender<CacheRequest>,
}

impl ImageCacheClient {
    pub fn new(sender: mpsc::Sender<CacheRequest>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, ImageCacheError>>) -> CacheRequest,
    ) -> Result<T, ImageCacheError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| ImageCacheError::ActorClosed)?;
        response.await.map_err(|_| ImageCacheError::ActorDropped)?
    }

    /// Takes a lease on `image`, pulling it first when nobody holds one.
    #[instrument(skip(self), fields(image = %image))]
    pub async fn acquire(&self, image: ImageReference) -> Result<ImageLease, ImageCacheError> {
        debug!("Sending request");
        self.request(|respond_to| CacheRequest::Acquire { image, respond_to }).await
    }

    /// Gives a lease back. With `evict`, the last holder removes the image.
    #[instrument(skip(self), fields(image = %image))]
    pub async fn release(&self, image: ImageReference, evict: bool) -> Result<EvictionOutcome, ImageCacheError> {
        debug!("Sending request");
        self.request(|respond_to| CacheRequest::Release { image, evict, respond_to }).await
    }

    /// Evicts an image no launch currently holds.
    #[instrument(skip(self), fields(image = %image))]
    pub async fn evict(&self, image: ImageReference) -> Result<(), ImageCacheError> {
        debug!("Sending request");
        self.request(|respond_to| CacheRequest::Evict { image, respond_to }).await
    }

    /// Gives a lease back without waiting for the answer, for callers that cannot
    /// await (a `Drop` impl). The request is queued before this returns.
    pub fn release_detached(&self, image: ImageReference, evict: bool) {
        let (respond_to, _) = oneshot::channel();
        if let Err(e) = self.sender.try_send(CacheRequest::Release {
            image,
            evict,
            respond_to,
        }) {
            warn!(error = %e, "Could not return image lease");
        }
    }

    pub async fn get(&self, image: ImageReference) -> Result<Option<CachedImage>, ImageCacheError> {
        self.request(|respond_to| CacheRequest::Get { image, respond_to }).await
    }
}
