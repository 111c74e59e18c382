//! # Image Cache Actor
//!
//! The pulled-image store inside the runtime daemon is shared, mutable state:
//! every launch pulls into it and every launch may evict from it. This module puts
//! a single owner in front of it.
//!
//! ## Concurrency Model
//!
//! [`ImageCacheActor`] runs in its own Tokio task and processes requests one at a
//! time, so the lease table needs no lock and no two pulls/evictions of the cache
//! ever overlap. A launch takes a lease before it creates a container and gives it
//! back after the container is deleted; an image is only evicted when the last
//! lease is returned. Eviction therefore can never pull the image out from under
//! another launch's create.
//!
//! The trade-off: a slow pull holds up every other cache request until it ends.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let (actor, cache) = ImageCacheActor::new(32);
//! tokio::spawn(actor.run(CacheContext { runtime, runtime_ctx }));
//!
//! let lease = cache.acquire(image.clone()).await?;
//! // ... create, start, stop, delete ...
//! let outcome = cache.release(image, true).await?;
//! ```

mod client;
mod error;

pub use client::*;
pub use error::*;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::model::{EvictionOutcome, ImageReference, LaunchStep};
use crate::runtime::{RuntimeClient, RuntimeContext};

/// One-shot response channel used by the actor.
pub type Response<T> = oneshot::Sender<Result<T, ImageCacheError>>;

/// Bookkeeping for one image the cache has pulled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub reference: ImageReference,
    /// Launches currently holding the image.
    pub leases: u32,
}

/// Granted by [`ImageCacheClient::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLease {
    pub image: ImageReference,
    /// Whether this acquire issued the pull (false when another lease already held it).
    pub pulled: bool,
    /// Lease count including this one.
    pub leases: u32,
}

#[derive(Debug)]
pub enum CacheRequest {
    Acquire {
        image: ImageReference,
        respond_to: Response<ImageLease>,
    },
    Release {
        image: ImageReference,
        evict: bool,
        respond_to: Response<EvictionOutcome>,
    },
    Evict {
        image: ImageReference,
        respond_to: Response<()>,
    },
    Get {
        image: ImageReference,
        respond_to: Response<Option<CachedImage>>,
    },
}

/// Dependencies injected when the actor starts running.
#[derive(Clone)]
pub struct CacheContext {
    pub runtime: Arc<dyn RuntimeClient>,
    pub runtime_ctx: RuntimeContext,
}

/// Sole owner of the image lease table.
pub struct ImageCacheActor {
    receiver: mpsc::Receiver<CacheRequest>,
    store: HashMap<ImageReference, CachedImage>,
}

impl ImageCacheActor {
    pub fn new(buffer_size: usize) -> (Self, ImageCacheClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            store: HashMap::new(),
        };
        (actor, ImageCacheClient::new(sender))
    }

    /// Runs the request loop until every client has been dropped.
    pub async fn run(mut self, context: CacheContext) {
        info!("Image cache started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                CacheRequest::Acquire { image, respond_to } => {
                    let _ = respond_to.send(self.acquire(&context, image).await);
                }
                CacheRequest::Release {
                    image,
                    evict,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.release(&context, image, evict).await);
                }
                CacheRequest::Evict { image, respond_to } => {
                    let _ = respond_to.send(self.evict(&context, image).await);
                }
                CacheRequest::Get { image, respond_to } => {
                    let entry = self.store.get(&image).cloned();
                    debug!(%image, found = entry.is_some(), "Get");
                    let _ = respond_to.send(Ok(entry));
                }
            }
        }

        info!(images = self.store.len(), "Image cache shutdown");
    }

    async fn acquire(&mut self, context: &CacheContext, image: ImageReference) -> Result<ImageLease, ImageCacheError> {
        if let Some(entry) = self.store.get_mut(&image).filter(|e| e.leases > 0) {
            entry.leases += 1;
            debug!(%image, leases = entry.leases, "Lease shared");
            return Ok(ImageLease {
                image,
                pulled: false,
                leases: entry.leases,
            });
        }

        // Nobody holds it: pull again even if we think it is cached, the runtime
        // treats a pull of a present image as a no-op.
        if let Err(source) = context.runtime.pull_image(&context.runtime_ctx, &image).await {
            warn!(%image, error = %source, "Pull failed");
            return Err(ImageCacheError::Runtime {
                step: LaunchStep::Pull,
                source,
            });
        }

        let entry = self.store.entry(image.clone()).or_insert_with(|| CachedImage {
            reference: image.clone(),
            leases: 0,
        });
        entry.leases += 1;
        info!(%image, leases = entry.leases, "Image pulled");
        Ok(ImageLease {
            image,
            pulled: true,
            leases: entry.leases,
        })
    }

    async fn release(
        &mut self,
        context: &CacheContext,
        image: ImageReference,
        evict: bool,
    ) -> Result<EvictionOutcome, ImageCacheError> {
        let entry = match self.store.get_mut(&image) {
            Some(entry) if entry.leases > 0 => entry,
            _ => {
                warn!(%image, "Release without lease");
                return Err(ImageCacheError::NotLeased(image.to_string()));
            }
        };
        entry.leases -= 1;

        if !evict {
            debug!(%image, leases = entry.leases, "Lease released, image retained");
            return Ok(EvictionOutcome::Retained);
        }
        if entry.leases > 0 {
            debug!(%image, leases = entry.leases, "Eviction deferred");
            return Ok(EvictionOutcome::Deferred { leases: entry.leases });
        }

        self.evict_idle(context, &image).await?;
        Ok(EvictionOutcome::Evicted)
    }

    async fn evict(&mut self, context: &CacheContext, image: ImageReference) -> Result<(), ImageCacheError> {
        if let Some(entry) = self.store.get(&image).filter(|e| e.leases > 0) {
            warn!(%image, leases = entry.leases, "Eviction refused");
            return Err(ImageCacheError::InUse {
                image: image.to_string(),
                leases: entry.leases,
            });
        }
        self.evict_idle(context, &image).await
    }

    async fn evict_idle(&mut self, context: &CacheContext, image: &ImageReference) -> Result<(), ImageCacheError> {
        match context.runtime.evict_image(&context.runtime_ctx, image).await {
            Ok(()) => {
                self.store.remove(image);
                info!(%image, images = self.store.len(), "Image evicted");
                Ok(())
            }
            Err(source) => {
                warn!(%image, error = %source, "Eviction failed");
                Err(ImageCacheError::Runtime {
                    step: LaunchStep::Evict,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FixtureDataset;
    use crate::runtime::mock::InMemoryRuntime;
    use crate::runtime::RuntimeError;

    fn start(runtime: Arc<InMemoryRuntime>, dir: &tempfile::TempDir) -> ImageCacheClient {
        let fixture = FixtureDataset::from_extracted(dir.path()).unwrap();
        let (actor, client) = ImageCacheActor::new(8);
        tokio::spawn(actor.run(CacheContext {
            runtime,
            runtime_ctx: RuntimeContext::new("reader", fixture, "/data"),
        }));
        client
    }

    #[tokio::test]
    async fn test_last_release_evicts() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(InMemoryRuntime::new());
        let cache = start(runtime.clone(), &dir);
        let image = ImageReference::new("reader:0");

        let first = cache.acquire(image.clone()).await.unwrap();
        let second = cache.acquire(image.clone()).await.unwrap();
        assert!(first.pulled);
        assert!(!second.pulled);
        assert_eq!(second.leases, 2);
        assert_eq!(runtime.pull_count(&image), 1);

        let outcome = cache.release(image.clone(), true).await.unwrap();
        assert_eq!(outcome, EvictionOutcome::Deferred { leases: 1 });
        assert!(runtime.has_image(&image));

        let outcome = cache.release(image.clone(), true).await.unwrap();
        assert_eq!(outcome, EvictionOutcome::Evicted);
        assert!(!runtime.has_image(&image));
        assert_eq!(cache.get(image).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_retained_image_can_be_evicted_later() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(InMemoryRuntime::new());
        let cache = start(runtime.clone(), &dir);
        let image = ImageReference::new("reader:0");

        cache.acquire(image.clone()).await.unwrap();
        assert_eq!(
            cache.release(image.clone(), false).await.unwrap(),
            EvictionOutcome::Retained
        );
        assert!(runtime.has_image(&image));

        cache.evict(image.clone()).await.unwrap();
        assert!(!runtime.has_image(&image));
    }

    #[tokio::test]
    async fn test_forced_eviction_refused_while_leased() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(InMemoryRuntime::new());
        let cache = start(runtime.clone(), &dir);
        let image = ImageReference::new("reader:0");

        cache.acquire(image.clone()).await.unwrap();
        let err = cache.evict(image.clone()).await.unwrap_err();
        assert_eq!(
            err,
            ImageCacheError::InUse {
                image: "reader:0".to_string(),
                leases: 1
            }
        );
        assert!(runtime.has_image(&image));
    }

    #[tokio::test]
    async fn test_release_without_lease() {
        let dir = tempfile::tempdir().unwrap();
        let cache = start(Arc::new(InMemoryRuntime::new()), &dir);
        let err = cache.release(ImageReference::new("x"), true).await.unwrap_err();
        assert_eq!(err, ImageCacheError::NotLeased("x".to_string()));
    }

    #[tokio::test]
    async fn test_pull_failure_grants_no_lease() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(InMemoryRuntime::new());
        runtime.fail_next(LaunchStep::Pull, RuntimeError::Unavailable("registry down".to_string()));
        let cache = start(runtime.clone(), &dir);
        let image = ImageReference::new("reader:0");

        let err = cache.acquire(image.clone()).await.unwrap_err();
        assert!(matches!(err, ImageCacheError::Runtime { step: LaunchStep::Pull, .. }));
        assert_eq!(cache.get(image.clone()).await.unwrap(), None);

        // The next attempt pulls again and succeeds.
        assert!(cache.acquire(image).await.unwrap().pulled);
    }

    #[tokio::test]
    async fn test_closed_actor() {
        let (actor, client) = ImageCacheActor::new(1);
        drop(actor);
        let err = client.acquire(ImageReference::new("x")).await.unwrap_err();
        assert_eq!(err, ImageCacheError::ActorClosed);
    }
}
