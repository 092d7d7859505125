//! Connection to the local Docker engine.

use async_trait::async_trait;
use bollard::Docker;
use dockhand_core::{EngineClient, Error, Result};
use tracing::{debug, info};

/// Handle to the Docker engine.
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using the platform defaults (unix socket, or named pipe on
    /// Windows), honouring `DOCKER_HOST`.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::EngineUnreachable(format!("Failed to connect to Docker: {}", e)))?;
        Ok(Self { docker })
    }

    /// Underlying client, for building a provisioner on the same connection.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

#[async_trait]
impl EngineClient for DockerEngine {
    async fn ping(&self) -> Result<()> {
        let reply = self
            .docker
            .ping()
            .await
            .map_err(|e| Error::EngineUnreachable(format!("Could not connect to Docker: {}", e)))?;
        debug!(reply = %reply, "Docker ping");

        if let Ok(version) = self.docker.version().await {
            info!(
                version = version.version.as_deref().unwrap_or("unknown"),
                api_version = version.api_version.as_deref().unwrap_or("unknown"),
                "Docker engine reachable"
            );
        }
        Ok(())
    }
}
