//! # In-Memory Runtime
//!
//! A [`RuntimeClient`] that keeps images and containers in process memory, for
//! testing the image cache and the orchestrator without a daemon.
//!
//! It enforces the same ordering rules a real daemon does: a container can only
//! be created from a pulled image, only a created container starts, a running
//! container must be stopped before it is deleted, and an image cannot be evicted
//! while a container still references it.
//!
//! # Example
//! ```ignore
//! let runtime = Arc::new(InMemoryRuntime::new());
//! runtime.fail_next(LaunchStep::Start, RuntimeError::Unavailable("boom".into()));
//!
//! // ... drive the orchestrator ...
//!
//! assert!(runtime.containers().is_empty());
//! assert_eq!(runtime.pull_count(&image), 1);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{RuntimeClient, RuntimeContext, RuntimeError};
use crate::model::{ContainerName, ImageReference, LaunchStep};

/// State of a container held by the in-memory runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Stopped,
}

/// One recorded call, in the order the runtime received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Pull(ImageReference),
    Create(ImageReference, ContainerName),
    Start(ContainerName),
    Stop(ContainerName),
    Delete(ContainerName),
    Evict(ImageReference),
}

#[derive(Debug, Clone)]
struct ContainerRecord {
    image: ImageReference,
    namespace: String,
    state: ContainerState,
}

/// A fault queued for one step.
#[derive(Debug)]
enum Fault {
    Fail(RuntimeError),
    Panic,
}

#[derive(Default)]
struct RuntimeState {
    images: HashSet<ImageReference>,
    pulls: HashMap<ImageReference, u32>,
    containers: HashMap<ContainerName, ContainerRecord>,
    faults: HashMap<LaunchStep, VecDeque<Fault>>,
    journal: Vec<RuntimeCall>,
}

/// In-process runtime with failure injection and a call journal.
#[derive(Default)]
pub struct InMemoryRuntime {
    state: Mutex<RuntimeState>,
    next_id: AtomicU64,
    latency: Option<Duration>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every operation, so concurrent launches interleave.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the next call of `step` fail with `error`. Calls queue up per step.
    pub fn fail_next(&self, step: LaunchStep, error: RuntimeError) {
        self.lock().faults.entry(step).or_default().push_back(Fault::Fail(error));
    }

    /// Makes the next call of `step` panic, as a buggy backend would.
    pub fn panic_next(&self, step: LaunchStep) {
        self.lock().faults.entry(step).or_default().push_back(Fault::Panic);
    }

    /// Images currently in local storage.
    pub fn images(&self) -> Vec<ImageReference> {
        self.lock().images.iter().cloned().collect()
    }

    pub fn has_image(&self, image: &ImageReference) -> bool {
        self.lock().images.contains(image)
    }

    /// Number of pulls that actually fetched `image` (no-op pulls excluded).
    pub fn pull_count(&self, image: &ImageReference) -> u32 {
        self.lock().pulls.get(image).copied().unwrap_or(0)
    }

    /// Containers not yet deleted, with their state.
    pub fn containers(&self) -> Vec<(ContainerName, ContainerState)> {
        self.lock()
            .containers
            .iter()
            .map(|(name, record)| (name.clone(), record.state))
            .collect()
    }

    pub fn container_state(&self, name: &ContainerName) -> Option<ContainerState> {
        self.lock().containers.get(name).map(|r| r.state)
    }

    pub fn journal(&self) -> Vec<RuntimeCall> {
        self.lock().journal.clone()
    }

    /// Journal entries of one container, in order.
    pub fn calls_for(&self, name: &ContainerName) -> Vec<RuntimeCall> {
        self.lock()
            .journal
            .iter()
            .filter(|call| match call {
                RuntimeCall::Create(_, n)
                | RuntimeCall::Start(n)
                | RuntimeCall::Stop(n)
                | RuntimeCall::Delete(n) => n == name,
                _ => false,
            })
            .cloned()
            .collect()
    }

    /// Seeds the image store as if `image` had been pulled earlier.
    pub fn preload(&self, image: &ImageReference) {
        self.lock().images.insert(image.clone());
    }

    fn lock(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Locks the state, or fires the fault queued for `step`.
    fn enter(&self, step: LaunchStep) -> Result<MutexGuard<'_, RuntimeState>, RuntimeError> {
        let mut state = self.lock();
        match state.faults.get_mut(&step).and_then(VecDeque::pop_front) {
            None => Ok(state),
            Some(Fault::Fail(error)) => Err(error),
            Some(Fault::Panic) => {
                drop(state);
                panic!("injected panic during {step}");
            }
        }
    }
}

fn transition(
    state: &mut RuntimeState,
    name: &ContainerName,
    operation: &'static str,
    from: ContainerState,
    to: ContainerState,
) -> Result<(), RuntimeError> {
    let record = state
        .containers
        .get_mut(name)
        .ok_or_else(|| RuntimeError::ContainerNotFound(name.to_string()))?;
    if record.state != from {
        return Err(RuntimeError::Rejected {
            operation,
            message: format!("container {name} is {:?}", record.state),
        });
    }
    record.state = to;
    Ok(())
}

#[async_trait]
impl RuntimeClient for InMemoryRuntime {
    async fn pull_image(&self, _ctx: &RuntimeContext, image: &ImageReference) -> Result<(), RuntimeError> {
        self.delay().await;
        let mut state = self.enter(LaunchStep::Pull)?;
        state.journal.push(RuntimeCall::Pull(image.clone()));
        if state.images.insert(image.clone()) {
            *state.pulls.entry(image.clone()).or_default() += 1;
        }
        Ok(())
    }

    async fn create_container(
        &self,
        ctx: &RuntimeContext,
        image: &ImageReference,
    ) -> Result<ContainerName, RuntimeError> {
        self.delay().await;
        let mut state = self.enter(LaunchStep::Create)?;
        if !state.images.contains(image) {
            return Err(RuntimeError::ImageNotFound(image.to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let name = ContainerName::new(format!("{}-{id}", ctx.namespace));
        state.containers.insert(
            name.clone(),
            ContainerRecord {
                image: image.clone(),
                namespace: ctx.namespace.clone(),
                state: ContainerState::Created,
            },
        );
        state.journal.push(RuntimeCall::Create(image.clone(), name.clone()));
        Ok(name)
    }

    async fn start_container(&self, _ctx: &RuntimeContext, name: &ContainerName) -> Result<(), RuntimeError> {
        self.delay().await;
        let mut state = self.enter(LaunchStep::Start)?;
        transition(&mut state, name, "start", ContainerState::Created, ContainerState::Running)?;
        state.journal.push(RuntimeCall::Start(name.clone()));
        Ok(())
    }

    async fn stop_container(&self, _ctx: &RuntimeContext, name: &ContainerName) -> Result<(), RuntimeError> {
        self.delay().await;
        let mut state = self.enter(LaunchStep::Stop)?;
        transition(&mut state, name, "stop", ContainerState::Running, ContainerState::Stopped)?;
        state.journal.push(RuntimeCall::Stop(name.clone()));
        Ok(())
    }

    async fn delete_container(&self, ctx: &RuntimeContext, name: &ContainerName) -> Result<(), RuntimeError> {
        self.delay().await;
        let mut state = self.enter(LaunchStep::Delete)?;
        let record = state
            .containers
            .get(name)
            .ok_or_else(|| RuntimeError::ContainerNotFound(name.to_string()))?;
        if record.namespace != ctx.namespace {
            return Err(RuntimeError::ContainerNotFound(name.to_string()));
        }
        if record.state == ContainerState::Running {
            return Err(RuntimeError::Rejected {
                operation: "delete",
                message: format!("container {name} is running"),
            });
        }
        state.containers.remove(name);
        state.journal.push(RuntimeCall::Delete(name.clone()));
        Ok(())
    }

    async fn evict_image(&self, _ctx: &RuntimeContext, image: &ImageReference) -> Result<(), RuntimeError> {
        self.delay().await;
        let mut state = self.enter(LaunchStep::Evict)?;
        if state.containers.values().any(|record| &record.image == image) {
            return Err(RuntimeError::Rejected {
                operation: "evict",
                message: format!("image {image} is in use"),
            });
        }
        if !state.images.remove(image) {
            return Err(RuntimeError::ImageNotFound(image.to_string()));
        }
        state.journal.push(RuntimeCall::Evict(image.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FixtureDataset;

    fn ctx(dir: &tempfile::TempDir) -> RuntimeContext {
        RuntimeContext::new("reader", FixtureDataset::from_extracted(dir.path()).unwrap(), "/data")
    }

    #[tokio::test]
    async fn test_full_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);
        let runtime = InMemoryRuntime::new();
        let image = ImageReference::new("reader:0");

        runtime.pull_image(&ctx, &image).await.unwrap();
        runtime.pull_image(&ctx, &image).await.unwrap();
        assert_eq!(runtime.pull_count(&image), 1);

        let name = runtime.create_container(&ctx, &image).await.unwrap();
        runtime.start_container(&ctx, &name).await.unwrap();
        assert_eq!(runtime.container_state(&name), Some(ContainerState::Running));

        // In use, so eviction is refused.
        assert!(runtime.evict_image(&ctx, &image).await.is_err());

        runtime.stop_container(&ctx, &name).await.unwrap();
        runtime.delete_container(&ctx, &name).await.unwrap();
        runtime.evict_image(&ctx, &image).await.unwrap();

        assert!(runtime.containers().is_empty());
        assert!(!runtime.has_image(&image));
        assert_eq!(runtime.calls_for(&name).len(), 4);
    }

    #[tokio::test]
    async fn test_create_requires_pulled_image() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = InMemoryRuntime::new();
        let err = runtime
            .create_container(&ctx(&dir), &ImageReference::new("missing:1"))
            .await
            .unwrap_err();
        assert_eq!(err, RuntimeError::ImageNotFound("missing:1".to_string()));
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);
        let runtime = InMemoryRuntime::new();
        let image = ImageReference::new("reader:0");
        runtime.fail_next(LaunchStep::Pull, RuntimeError::Unavailable("down".to_string()));

        assert!(runtime.pull_image(&ctx, &image).await.is_err());
        assert!(runtime.pull_image(&ctx, &image).await.is_ok());
    }

    #[tokio::test]
    async fn test_running_container_cannot_be_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);
        let runtime = InMemoryRuntime::new();
        let image = ImageReference::new("reader:0");
        runtime.preload(&image);

        let name = runtime.create_container(&ctx, &image).await.unwrap();
        runtime.start_container(&ctx, &name).await.unwrap();
        let err = runtime.delete_container(&ctx, &name).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Rejected { operation: "delete", .. }));
    }
}
