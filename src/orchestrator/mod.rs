//! # Reader Lifecycle Orchestration
//!
//! [`LifecycleOrchestrator::launch`] drives one reader container through
//! `pull → create → start → stop → delete`, then hands the image lease back to
//! the [image cache](crate::image_cache), which evicts the image once no other
//! launch holds it.
//!
//! ## Failure Policy
//!
//! The first failing step aborts the sequence and is reported in a
//! [`LaunchError`] naming the step, the container (if one exists) and the steps
//! that completed. With [`LaunchPolicy::cleanup_on_failure`] set, the orchestrator
//! then compensates:
//!
//! | failed step | compensation                       |
//! |-------------|------------------------------------|
//! | create      | none                               |
//! | start       | delete the created container       |
//! | stop        | none (container state is unknown)  |
//! | delete      | none                               |
//!
//! The image lease is always returned, so a failed launch never pins an image in
//! the cache. A launch that panics part way returns it from a drop guard. Compensation errors are logged and never replace the original error.
//!
//! ## Concurrency
//!
//! `launch` takes `&self` and the orchestrator is cheap to clone; each HTTP
//! request runs its own launch concurrently. Steps within one launch are strictly
//! sequential; launches interleave freely at the daemon except for pull/evict,
//! which the image cache serialises.

mod error;

pub use error::*;

use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::image_cache::{ImageCacheClient, ImageCacheError};
use crate::model::{
    ContainerName, EvictionOutcome, ImageReference, LaunchReport, LaunchRequest, LaunchStep,
};
use crate::runtime::{RuntimeClient, RuntimeContext, RuntimeError};

/// Knobs that decide what happens around the happy path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchPolicy {
    /// Ask the cache to evict the image when this launch gives its lease back.
    pub evict_after_launch: bool,
    /// Delete the container of a launch whose start failed. Containers of a failed
    /// stop or delete are reported, never touched again.
    pub cleanup_on_failure: bool,
}

impl Default for LaunchPolicy {
    fn default() -> Self {
        Self {
            evict_after_launch: true,
            cleanup_on_failure: true,
        }
    }
}

#[derive(Clone)]
pub struct LifecycleOrchestrator {
    runtime: Arc<dyn RuntimeClient>,
    cache: ImageCacheClient,
    ctx: RuntimeContext,
    policy: LaunchPolicy,
}

impl LifecycleOrchestrator {
    pub fn new(
        runtime: Arc<dyn RuntimeClient>,
        cache: ImageCacheClient,
        ctx: RuntimeContext,
        policy: LaunchPolicy,
    ) -> Self {
        Self {
            runtime,
            cache,
            ctx,
            policy,
        }
    }

    /// Runs one full reader lifecycle for `image`.
    pub async fn launch(&self, request: LaunchRequest, image: &ImageReference) -> Result<LaunchReport, LaunchError> {
        let span = info_span!("launch", request_id = request.id, image = %image);
        async {
            info!("Launching reader");
            let result = self.run_steps(request.id, image).await;
            match &result {
                Ok(report) => info!(container = %report.container, eviction = ?report.eviction, "Reader finished"),
                Err(e) => warn!(error = %e, "Reader launch failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_steps(&self, request_id: u64, image: &ImageReference) -> Result<LaunchReport, LaunchError> {
        let mut steps = Vec::with_capacity(6);

        let lease = self
            .cache
            .acquire(image.clone())
            .await
            .map_err(|e| LaunchError::from_cache(request_id, None, steps.clone(), e))?;
        debug!(step = %LaunchStep::Pull, pulled = lease.pulled, leases = lease.leases, "Step ok");
        steps.push(LaunchStep::Pull);
        let lease = LeaseGuard::new(&self.cache, image, self.policy.evict_after_launch);

        let container = match self.runtime.create_container(&self.ctx, image).await {
            Ok(name) => name,
            Err(source) => {
                return Err(self
                    .abort(request_id, lease, LaunchStep::Create, None, steps, source)
                    .await)
            }
        };
        debug!(step = %LaunchStep::Create, %container, "Step ok");
        steps.push(LaunchStep::Create);

        if let Err(source) = self.runtime.start_container(&self.ctx, &container).await {
            return Err(self
                .abort(request_id, lease, LaunchStep::Start, Some(container), steps, source)
                .await);
        }
        debug!(step = %LaunchStep::Start, %container, "Step ok");
        steps.push(LaunchStep::Start);

        if let Err(source) = self.runtime.stop_container(&self.ctx, &container).await {
            return Err(self
                .abort(request_id, lease, LaunchStep::Stop, Some(container), steps, source)
                .await);
        }
        debug!(step = %LaunchStep::Stop, %container, "Step ok");
        steps.push(LaunchStep::Stop);

        if let Err(source) = self.runtime.delete_container(&self.ctx, &container).await {
            return Err(self
                .abort(request_id, lease, LaunchStep::Delete, Some(container), steps, source)
                .await);
        }
        debug!(step = %LaunchStep::Delete, %container, "Step ok");
        steps.push(LaunchStep::Delete);

        let eviction = lease
            .release()
            .await
            .map_err(|e| LaunchError::from_cache(request_id, Some(container.clone()), steps.clone(), e))?;
        if eviction == EvictionOutcome::Evicted {
            debug!(step = %LaunchStep::Evict, "Step ok");
            steps.push(LaunchStep::Evict);
        }

        Ok(LaunchReport {
            request_id,
            image: image.clone(),
            container,
            steps,
            eviction,
        })
    }

    /// Logs the failed step, compensates per policy and builds the error.
    async fn abort(
        &self,
        request_id: u64,
        lease: LeaseGuard,
        step: LaunchStep,
        container: Option<ContainerName>,
        completed: Vec<LaunchStep>,
        source: RuntimeError,
    ) -> LaunchError {
        warn!(%step, container = ?container, error = %source, "Step failed");

        if self.policy.cleanup_on_failure && step == LaunchStep::Start {
            if let Some(name) = &container {
                self.compensate_delete(name).await;
            }
        }

        if let Err(e) = lease.release().await {
            warn!(error = %e, "Could not release image lease after failure");
        }

        LaunchError::Step {
            request_id,
            step,
            container,
            completed,
            source,
        }
    }

    async fn compensate_delete(&self, name: &ContainerName) {
        match self.runtime.delete_container(&self.ctx, name).await {
            Ok(()) => info!(container = %name, "Removed container left by failed launch"),
            Err(e) => warn!(container = %name, error = %e, "Cleanup delete failed"),
        }
    }
}

/// Holds a launch's image lease. Dropping it unreleased (the launch panicked or
/// was cancelled) queues the release so the image never stays leased.
struct LeaseGuard {
    cache: ImageCacheClient,
    image: ImageReference,
    evict: bool,
    armed: bool,
}

impl LeaseGuard {
    fn new(cache: &ImageCacheClient, image: &ImageReference, evict: bool) -> Self {
        Self {
            cache: cache.clone(),
            image: image.clone(),
            evict,
            armed: true,
        }
    }

    async fn release(mut self) -> Result<EvictionOutcome, ImageCacheError> {
        self.armed = false;
        self.cache.release(self.image.clone(), self.evict).await
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!(image = %self.image, "Launch dropped with its lease held, releasing");
            self.cache.release_detached(self.image.clone(), self.evict);
        }
    }
}
