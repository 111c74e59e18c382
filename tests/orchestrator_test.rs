use std::sync::Arc;
use std::time::Duration;

use daftlet::image_cache::ImageCacheError;
use daftlet::lifecycle::DaftletSystem;
use daftlet::model::{EvictionOutcome, FixtureDataset, ImageReference, LaunchRequest, LaunchStep};
use daftlet::orchestrator::{LaunchError, LaunchPolicy};
use daftlet::runtime::mock::{ContainerState, InMemoryRuntime, RuntimeCall};
use daftlet::runtime::{RuntimeContext, RuntimeError};

const IMAGE: &str = "registry.local/daft/reader:0";

struct Harness {
    _fixture_dir: tempfile::TempDir,
    runtime: Arc<InMemoryRuntime>,
    system: DaftletSystem,
    image: ImageReference,
}

fn harness(runtime: InMemoryRuntime, policy: LaunchPolicy) -> Harness {
    let fixture_dir = tempfile::tempdir().unwrap();
    let fixture = FixtureDataset::from_extracted(fixture_dir.path()).unwrap();
    let runtime = Arc::new(runtime);
    let system = DaftletSystem::new(
        runtime.clone(),
        RuntimeContext::new("reader", fixture, "/run/eventual/fixtures"),
        policy,
    );
    Harness {
        _fixture_dir: fixture_dir,
        runtime,
        system,
        image: ImageReference::new(IMAGE),
    }
}

/// Pattern: real cache actor and orchestrator over the in-memory runtime.
#[tokio::test]
async fn test_launch_runs_every_step_in_order() {
    let h = harness(InMemoryRuntime::new(), LaunchPolicy::default());

    let report = h
        .system
        .orchestrator
        .launch(LaunchRequest::new(1), &h.image)
        .await
        .unwrap();

    assert_eq!(report.request_id, 1);
    assert_eq!(
        report.steps,
        vec![
            LaunchStep::Pull,
            LaunchStep::Create,
            LaunchStep::Start,
            LaunchStep::Stop,
            LaunchStep::Delete,
            LaunchStep::Evict,
        ]
    );
    assert_eq!(report.eviction, EvictionOutcome::Evicted);

    let name = report.container.clone();
    assert_eq!(
        h.runtime.journal(),
        vec![
            RuntimeCall::Pull(h.image.clone()),
            RuntimeCall::Create(h.image.clone(), name.clone()),
            RuntimeCall::Start(name.clone()),
            RuntimeCall::Stop(name.clone()),
            RuntimeCall::Delete(name),
            RuntimeCall::Evict(h.image.clone()),
        ]
    );
    assert!(h.runtime.containers().is_empty());
    assert!(!h.runtime.has_image(&h.image));

    h.system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sequential_launches_use_distinct_containers() {
    let h = harness(InMemoryRuntime::new(), LaunchPolicy::default());

    let first = h.system.orchestrator.launch(LaunchRequest::new(1), &h.image).await.unwrap();
    let second = h.system.orchestrator.launch(LaunchRequest::new(2), &h.image).await.unwrap();

    assert_ne!(first.container, second.container);
    // Each launch evicted, so the second had to pull again.
    assert_eq!(h.runtime.pull_count(&h.image), 2);
    assert!(h.runtime.containers().is_empty());
}

#[tokio::test]
async fn test_concurrent_launches_share_one_pull() {
    let h = harness(
        InMemoryRuntime::new().with_latency(Duration::from_millis(20)),
        LaunchPolicy::default(),
    );
    let orchestrator = h.system.orchestrator.clone();

    let (a, b) = tokio::join!(
        h.system.orchestrator.launch(LaunchRequest::new(1), &h.image),
        orchestrator.launch(LaunchRequest::new(2), &h.image),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.container, b.container);
    assert_eq!(h.runtime.pull_count(&h.image), 1);

    // Exactly one of them was the last holder and evicted.
    let mut outcomes = vec![a.eviction, b.eviction];
    outcomes.sort_by_key(|o| matches!(o, EvictionOutcome::Evicted));
    assert_eq!(
        outcomes,
        vec![EvictionOutcome::Deferred { leases: 1 }, EvictionOutcome::Evicted]
    );
    let evictions = h
        .runtime
        .journal()
        .into_iter()
        .filter(|call| matches!(call, RuntimeCall::Evict(_)))
        .count();
    assert_eq!(evictions, 1);

    // Each container went through its own full cycle.
    for name in [&a.container, &b.container] {
        assert_eq!(
            h.runtime.calls_for(name),
            vec![
                RuntimeCall::Create(h.image.clone(), name.clone()),
                RuntimeCall::Start(name.clone()),
                RuntimeCall::Stop(name.clone()),
                RuntimeCall::Delete(name.clone()),
            ]
        );
    }
    assert!(h.runtime.containers().is_empty());
    assert!(!h.runtime.has_image(&h.image));
}

#[tokio::test]
async fn test_pull_failure_stops_before_create() {
    let runtime = InMemoryRuntime::new();
    runtime.fail_next(LaunchStep::Pull, RuntimeError::ImageNotFound(IMAGE.to_string()));
    let h = harness(runtime, LaunchPolicy::default());

    let err = h
        .system
        .orchestrator
        .launch(LaunchRequest::new(4), &h.image)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        LaunchError::Step {
            request_id: 4,
            step: LaunchStep::Pull,
            container: None,
            completed: Vec::new(),
            source: RuntimeError::ImageNotFound(IMAGE.to_string()),
        }
    );
    assert!(h.runtime.containers().is_empty());
    assert!(!h
        .runtime
        .journal()
        .iter()
        .any(|call| matches!(call, RuntimeCall::Create(..))));
}

#[tokio::test]
async fn test_create_failure_releases_the_image() {
    let runtime = InMemoryRuntime::new();
    runtime.fail_next(LaunchStep::Create, RuntimeError::Unavailable("socket closed".to_string()));
    let h = harness(runtime, LaunchPolicy::default());

    let err = h
        .system
        .orchestrator
        .launch(LaunchRequest::new(5), &h.image)
        .await
        .unwrap_err();

    assert_eq!(err.step(), Some(LaunchStep::Create));
    assert_eq!(err.container(), None);
    // The lease was returned, so the cache evicted the image.
    assert!(!h.runtime.has_image(&h.image));
    assert_eq!(h.system.cache.get(h.image.clone()).await.unwrap(), None);
}

#[tokio::test]
async fn test_start_failure_deletes_the_created_container() {
    let runtime = InMemoryRuntime::new();
    runtime.fail_next(
        LaunchStep::Start,
        RuntimeError::Rejected {
            operation: "start",
            message: "no such entrypoint".to_string(),
        },
    );
    let h = harness(runtime, LaunchPolicy::default());

    let err = h
        .system
        .orchestrator
        .launch(LaunchRequest::new(6), &h.image)
        .await
        .unwrap_err();

    let container = err.container().cloned().unwrap();
    match &err {
        LaunchError::Step { step, completed, .. } => {
            assert_eq!(*step, LaunchStep::Start);
            assert_eq!(completed, &vec![LaunchStep::Pull, LaunchStep::Create]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        h.runtime.calls_for(&container),
        vec![
            RuntimeCall::Create(h.image.clone(), container.clone()),
            RuntimeCall::Delete(container.clone()),
        ]
    );
    assert!(h.runtime.containers().is_empty());
    assert!(!h.runtime.has_image(&h.image));
}

#[tokio::test]
async fn test_start_failure_without_cleanup_leaves_the_container() {
    let runtime = InMemoryRuntime::new();
    runtime.fail_next(LaunchStep::Start, RuntimeError::Unavailable("timeout".to_string()));
    let h = harness(
        runtime,
        LaunchPolicy {
            evict_after_launch: true,
            cleanup_on_failure: false,
        },
    );

    let err = h
        .system
        .orchestrator
        .launch(LaunchRequest::new(7), &h.image)
        .await
        .unwrap_err();

    let container = err.container().cloned().unwrap();
    assert_eq!(h.runtime.container_state(&container), Some(ContainerState::Created));
    // The leftover container pins the image in the runtime.
    assert!(h.runtime.has_image(&h.image));
}

#[tokio::test]
async fn test_stop_failure_reports_the_running_container() {
    let runtime = InMemoryRuntime::new();
    runtime.fail_next(LaunchStep::Stop, RuntimeError::Unavailable("daemon restarting".to_string()));
    let h = harness(runtime, LaunchPolicy::default());

    let err = h
        .system
        .orchestrator
        .launch(LaunchRequest::new(8), &h.image)
        .await
        .unwrap_err();

    assert_eq!(err.step(), Some(LaunchStep::Stop));
    let container = err.container().cloned().unwrap();
    assert_eq!(h.runtime.container_state(&container), Some(ContainerState::Running));

    // The lease is back even though the image could not be evicted.
    let cached = h.system.cache.get(h.image.clone()).await.unwrap().unwrap();
    assert_eq!(cached.leases, 0);
}

#[tokio::test]
async fn test_eviction_failure_is_reported_as_evict_step() {
    let runtime = InMemoryRuntime::new();
    runtime.fail_next(LaunchStep::Evict, RuntimeError::Unavailable("gone".to_string()));
    let h = harness(runtime, LaunchPolicy::default());

    let err = h
        .system
        .orchestrator
        .launch(LaunchRequest::new(9), &h.image)
        .await
        .unwrap_err();

    match err {
        LaunchError::Step { step, completed, .. } => {
            assert_eq!(step, LaunchStep::Evict);
            assert_eq!(completed.last(), Some(&LaunchStep::Delete));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(h.runtime.containers().is_empty());
    assert!(h.runtime.has_image(&h.image));

    // A later forced eviction clears it.
    h.system.cache.evict(h.image.clone()).await.unwrap();
    assert!(!h.runtime.has_image(&h.image));
}

#[tokio::test]
async fn test_retained_image_is_reused_then_force_evicted() {
    let h = harness(
        InMemoryRuntime::new(),
        LaunchPolicy {
            evict_after_launch: false,
            cleanup_on_failure: true,
        },
    );

    let first = h.system.orchestrator.launch(LaunchRequest::new(1), &h.image).await.unwrap();
    let second = h.system.orchestrator.launch(LaunchRequest::new(2), &h.image).await.unwrap();

    assert_eq!(first.eviction, EvictionOutcome::Retained);
    assert_eq!(second.eviction, EvictionOutcome::Retained);
    assert!(!first.steps.contains(&LaunchStep::Evict));
    assert_eq!(h.runtime.pull_count(&h.image), 1);
    assert!(h.runtime.has_image(&h.image));

    h.system.cache.evict(h.image.clone()).await.unwrap();
    assert!(!h.runtime.has_image(&h.image));
    assert_eq!(
        h.system.cache.evict(h.image.clone()).await.unwrap_err(),
        ImageCacheError::Runtime {
            step: LaunchStep::Evict,
            source: RuntimeError::ImageNotFound(IMAGE.to_string()),
        }
    );
}

#[tokio::test]
async fn test_panicking_launch_returns_its_lease() {
    let runtime = InMemoryRuntime::new();
    runtime.panic_next(LaunchStep::Create);
    let h = harness(runtime, LaunchPolicy::default());
    let orchestrator = h.system.orchestrator.clone();
    let image = h.image.clone();

    let joined = tokio::spawn(async move { orchestrator.launch(LaunchRequest::new(11), &image).await }).await;
    assert!(joined.unwrap_err().is_panic());

    // The lease came back and, being the last one, evicted the image.
    assert_eq!(h.system.cache.get(h.image.clone()).await.unwrap(), None);
    assert!(!h.runtime.has_image(&h.image));

    let report = h
        .system
        .orchestrator
        .launch(LaunchRequest::new(12), &h.image)
        .await
        .unwrap();
    assert_eq!(report.eviction, EvictionOutcome::Evicted);
}

#[tokio::test]
async fn test_panic_after_start_leaves_no_lease_behind() {
    let runtime = InMemoryRuntime::new();
    runtime.panic_next(LaunchStep::Stop);
    let h = harness(
        runtime,
        LaunchPolicy {
            evict_after_launch: false,
            cleanup_on_failure: true,
        },
    );
    let orchestrator = h.system.orchestrator.clone();
    let image = h.image.clone();

    let joined = tokio::spawn(async move { orchestrator.launch(LaunchRequest::new(13), &image).await }).await;
    assert!(joined.unwrap_err().is_panic());

    let cached = h.system.cache.get(h.image.clone()).await.unwrap().unwrap();
    assert_eq!(cached.leases, 0);
}

#[tokio::test]
async fn test_shutdown_closes_the_cache() {
    let h = harness(InMemoryRuntime::new(), LaunchPolicy::default());
    let cache = h.system.cache.clone();
    let orchestrator = h.system.orchestrator.clone();
    drop(cache);
    drop(orchestrator);

    h.system.shutdown().await.unwrap();
}
