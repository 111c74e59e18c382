//! `daftlet` daemon entry point.
//!
//! Startup is all-or-nothing: a bad config, a failed download or extraction, an
//! unreachable runtime socket or an unbindable listener logs the cause and exits
//! non-zero before any request is served.

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;

use daftlet::config::{ConfigError, DaftletConfig};
use daftlet::http::{self, TriggerState};
use daftlet::lifecycle::{setup_tracing, DaftletSystem};
use daftlet::model::LaunchRequest;
use daftlet::provision::FixtureProvisioner;
use daftlet::runtime::{DockerRuntime, RuntimeClient};
use daftlet::storage::object_store_for;
use tokio::net::TcpListener;
use tracing::{error, info, info_span, warn, Instrument};

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = load_config().map_err(|e| fatal("config", e))?;
    info!(image = %config.image_reference, listen = %config.listen_addr, "Starting daftlet");

    let store = object_store_for(&config.fixture_archive_remote_path, &config.storage_region)
        .await
        .map_err(|e| fatal("object store", e))?;
    let dataset = FixtureProvisioner::from_config(store, &config)
        .provision()
        .instrument(info_span!("provision"))
        .await
        .map_err(|e| fatal("provision", e))?;

    let runtime: Arc<dyn RuntimeClient> =
        Arc::new(DockerRuntime::connect(&config.runtime_socket_path).map_err(|e| fatal("runtime", e))?);
    let system = DaftletSystem::from_config(&config, runtime, dataset);
    let image = config.image();

    if config.launch_on_startup {
        if let Err(e) = system.orchestrator.launch(LaunchRequest::default(), &image).await {
            warn!(error = %e, "Startup launch failed");
        }
    }

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(|e| fatal("listen", e))?;
    let state = TriggerState {
        orchestrator: system.orchestrator.clone(),
        image,
        reject_malformed_requests: config.reject_malformed_requests,
    };

    let served = http::serve(listener, state, shutdown_signal()).await;
    system.shutdown().await?;
    served.map_err(|e| fatal("server", e))?;

    info!("daftlet stopped");
    Ok(())
}

fn load_config() -> Result<DaftletConfig, ConfigError> {
    let config = match std::env::var_os("DAFTLET_CONFIG") {
        Some(path) => DaftletConfig::load(&PathBuf::from(path))?,
        None => DaftletConfig::default(),
    };
    let config = config.with_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn fatal(stage: &'static str, err: impl Display) -> String {
    error!(stage, error = %err, "Fatal error");
    format!("{stage}: {err}")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
