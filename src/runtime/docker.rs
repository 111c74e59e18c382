use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::{CreateImageOptions, RemoveImageOptions};
use bollard::models::HostConfig;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::TryStreamExt;
use tracing::{debug, info};

use super::{RuntimeClient, RuntimeContext, RuntimeError};
use crate::model::{ContainerName, ImageReference};

/// Label carrying the namespace of every container created by this daemon.
pub const NAMESPACE_LABEL: &str = "io.daftlet.namespace";

const CONNECT_TIMEOUT_SECS: u64 = 120;

/// [`RuntimeClient`] backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to the daemon listening on `socket_path`.
    pub fn connect(socket_path: &Path) -> Result<Self, RuntimeError> {
        let socket = socket_path.to_string_lossy();
        let docker = Docker::connect_with_unix(&socket, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        info!(socket = %socket, "Connected to container runtime");
        Ok(Self { docker })
    }
}

fn map_error(operation: &'static str, subject: &str, err: BollardError) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError { status_code: 404, .. } => match operation {
            "pull" | "create" | "evict" => RuntimeError::ImageNotFound(subject.to_string()),
            _ => RuntimeError::ContainerNotFound(subject.to_string()),
        },
        BollardError::DockerResponseServerError { message, .. } => RuntimeError::Rejected { operation, message },
        other => RuntimeError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn pull_image(&self, _ctx: &RuntimeContext, image: &ImageReference) -> Result<(), RuntimeError> {
        if self.docker.inspect_image(image.as_str()).await.is_ok() {
            debug!(%image, "Image already present");
            return Ok(());
        }

        let options = Some(CreateImageOptions {
            from_image: image.as_str().to_string(),
            ..Default::default()
        });
        let mut stream = self.docker.create_image(options, None, None);
        while let Some(progress) = stream
            .try_next()
            .await
            .map_err(|e| map_error("pull", image.as_str(), e))?
        {
            if let Some(status) = progress.status {
                debug!(%image, status = %status, "Pull progress");
            }
        }
        Ok(())
    }

    async fn create_container(
        &self,
        ctx: &RuntimeContext,
        image: &ImageReference,
    ) -> Result<ContainerName, RuntimeError> {
        let binds = vec![format!(
            "{}:{}:ro",
            ctx.fixture.root().display(),
            ctx.fixture_mount
        )];
        let config = Config {
            image: Some(image.as_str().to_string()),
            labels: Some(HashMap::from([(NAMESPACE_LABEL.to_string(), ctx.namespace.clone())])),
            host_config: Some(HostConfig {
                binds: Some(binds),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(|e| map_error("create", image.as_str(), e))?;
        Ok(ContainerName::new(created.id))
    }

    async fn start_container(&self, _ctx: &RuntimeContext, name: &ContainerName) -> Result<(), RuntimeError> {
        self.docker
            .start_container(name.as_str(), None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_error("start", name.as_str(), e))
    }

    async fn stop_container(&self, _ctx: &RuntimeContext, name: &ContainerName) -> Result<(), RuntimeError> {
        self.docker
            .stop_container(name.as_str(), None::<StopContainerOptions>)
            .await
            .map_err(|e| map_error("stop", name.as_str(), e))
    }

    async fn delete_container(&self, _ctx: &RuntimeContext, name: &ContainerName) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(
                name.as_str(),
                Some(RemoveContainerOptions {
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| map_error("delete", name.as_str(), e))
    }

    async fn evict_image(&self, _ctx: &RuntimeContext, image: &ImageReference) -> Result<(), RuntimeError> {
        self.docker
            .remove_image(image.as_str(), None::<RemoveImageOptions>, None)
            .await
            .map(|_| ())
            .map_err(|e| map_error("evict", image.as_str(), e))
    }
}
