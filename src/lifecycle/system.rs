use std::sync::Arc;

use tracing::{error, info};

use crate::config::DaftletConfig;
use crate::image_cache::{CacheContext, ImageCacheActor, ImageCacheClient};
use crate::model::FixtureDataset;
use crate::orchestrator::{LaunchPolicy, LifecycleOrchestrator};
use crate::runtime::{RuntimeClient, RuntimeContext};

const CACHE_BUFFER: usize = 64;

/// Running daemon core: the image cache actor and the orchestrator that uses it.
///
/// # Example
///
/// ```ignore
/// let system = DaftletSystem::from_config(&config, runtime, dataset);
///
/// let report = system
///     .orchestrator
///     .launch(LaunchRequest::new(1), &config.image())
///     .await?;
///
/// system.shutdown().await?;
/// ```
pub struct DaftletSystem {
    /// Runs reader lifecycles against the provisioned dataset.
    pub orchestrator: LifecycleOrchestrator,

    /// Direct access to the image cache (forced eviction, inspection).
    pub cache: ImageCacheClient,

    /// Task handles of spawned actors (used for graceful shutdown).
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl DaftletSystem {
    /// Spawns the image cache actor and wires the orchestrator to it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(runtime: Arc<dyn RuntimeClient>, runtime_ctx: RuntimeContext, policy: LaunchPolicy) -> Self {
        let (cache_actor, cache) = ImageCacheActor::new(CACHE_BUFFER);
        let cache_handle = tokio::spawn(cache_actor.run(CacheContext {
            runtime: runtime.clone(),
            runtime_ctx: runtime_ctx.clone(),
        }));

        let orchestrator = LifecycleOrchestrator::new(runtime, cache.clone(), runtime_ctx, policy);

        Self {
            orchestrator,
            cache,
            handles: vec![cache_handle],
        }
    }

    pub fn from_config(config: &DaftletConfig, runtime: Arc<dyn RuntimeClient>, fixture: FixtureDataset) -> Self {
        let runtime_ctx = RuntimeContext::new(
            config.runtime_namespace.clone(),
            fixture,
            config.container_fixture_mount.clone(),
        );
        let policy = LaunchPolicy {
            evict_after_launch: config.evict_after_launch,
            cleanup_on_failure: config.cleanup_on_failure,
        };
        Self::new(runtime, runtime_ctx, policy)
    }

    /// Drops the system's clients and waits for every actor task to finish.
    ///
    /// Returns an error if an actor task panicked.
    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down system...");

        drop(self.orchestrator);
        drop(self.cache);

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Actor task failed: {:?}", e);
                return Err(format!("Actor task failed: {:?}", e));
            }
        }

        info!("System shutdown complete.");
        Ok(())
    }
}
