//! Starting and purging ephemeral containers.

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding as DockerPortBinding, PortMap};
use dockhand_core::{Error, ProvisionRequest, Provisioner, ResourceHandle, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// When to pull the image before starting a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullPolicy {
    Always,
    #[default]
    IfMissing,
    Never,
}

/// Provisions containers on a Docker engine.
pub struct DockerProvisioner {
    docker: Docker,
    pull_policy: PullPolicy,
}

impl DockerProvisioner {
    pub fn new(docker: Docker) -> Self {
        Self {
            docker,
            pull_policy: PullPolicy::default(),
        }
    }

    /// Set the pull policy.
    pub fn with_pull_policy(mut self, policy: PullPolicy) -> Self {
        self.pull_policy = policy;
        self
    }

    async fn ensure_image(&self, request: &ProvisionRequest) -> Result<()> {
        let image_ref = request.image_ref();
        let present = self.docker.inspect_image(&image_ref).await.is_ok();

        let pull = match self.pull_policy {
            PullPolicy::Always => true,
            PullPolicy::IfMissing => !present,
            PullPolicy::Never => false,
        };
        if !pull {
            debug!(image = %image_ref, present, "Skipping image pull");
            return Ok(());
        }

        info!(image = %image_ref, "Pulling image");
        let options = CreateImageOptions {
            from_image: request.image.as_str(),
            tag: request.tag.as_str(),
            ..Default::default()
        };
        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(item) = progress.next().await {
            let info = item.map_err(|e| provisioning_failed(request, e))?;
            if let Some(status) = info.status {
                debug!(image = %image_ref, status = %status, "Pull progress");
            }
        }
        Ok(())
    }

    async fn start(&self, request: &ProvisionRequest, name: &str) -> Result<String> {
        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name,
                    platform: None,
                }),
                container_config(request),
            )
            .await
            .map_err(|e| provisioning_failed(request, e))?;

        for warning in &created.warnings {
            warn!(container = %name, warning = %warning, "Docker warning on create");
        }

        if let Err(e) = self
            .docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
        {
            // Created but never started: remove it so nothing leaks.
            if let Err(cleanup) = self.remove(&created.id).await {
                warn!(container = %created.id, error = %cleanup, "Failed to remove unstarted container");
            }
            return Err(provisioning_failed(request, e));
        }

        Ok(created.id)
    }

    async fn bound_ports(&self, id: &str) -> Result<HashMap<u16, u16>> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| Error::Internal(format!("Failed to inspect container {}: {}", id, e)))?;

        Ok(inspect
            .network_settings
            .and_then(|n| n.ports)
            .map(|ports| host_ports(&ports))
            .unwrap_or_default())
    }

    async fn remove(&self, id: &str) -> std::result::Result<(), DockerError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(options)).await
    }
}

#[async_trait]
impl Provisioner for DockerProvisioner {
    async fn provision(&self, request: &ProvisionRequest) -> Result<ResourceHandle> {
        self.ensure_image(request).await?;

        let name = format!("{}-{}", request.name_prefix, uuid::Uuid::new_v4());
        info!(
            image = %request.image_ref(),
            container = %name,
            env_keys = ?request.env.keys().collect::<Vec<_>>(),
            "Starting container"
        );

        let id = self.start(request, &name).await?;

        let ports = match self.bound_ports(&id).await {
            Ok(ports) => ports,
            Err(e) => {
                if let Err(cleanup) = self.remove(&id).await {
                    warn!(container = %id, error = %cleanup, "Failed to remove container");
                }
                return Err(provisioning_failed(request, e));
            }
        };

        Ok(ResourceHandle::new(id, name, request.image_ref(), ports))
    }

    async fn teardown(&self, handle: ResourceHandle) -> Result<()> {
        info!(container = %handle.id(), name = %handle.name(), "Purging container");

        match self.remove(handle.id()).await {
            Ok(()) => Ok(()),
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                warn!(container = %handle.id(), "Container already gone");
                Ok(())
            }
            Err(e) => Err(Error::TeardownFailed {
                container: handle.id().to_string(),
                reason: e.to_string(),
                suite_outcome: None,
                preceding: None,
            }),
        }
    }
}

fn provisioning_failed(request: &ProvisionRequest, e: impl std::fmt::Display) -> Error {
    Error::ProvisioningFailed {
        image: request.image_ref(),
        reason: e.to_string(),
    }
}

/// Container configuration for a request.
fn container_config(request: &ProvisionRequest) -> Config<String> {
    let exposed_ports: HashMap<String, HashMap<(), ()>> = request
        .ports
        .iter()
        .map(|p| (p.key(), HashMap::new()))
        .collect();

    let port_bindings: PortMap = request
        .ports
        .iter()
        .map(|p| {
            let binding = DockerPortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: p.host_port.map(|port| port.to_string()),
            };
            (p.key(), Some(vec![binding]))
        })
        .collect();

    let mut labels = HashMap::new();
    labels.insert("dev.dockhand.ephemeral".to_string(), "true".to_string());

    Config {
        image: Some(request.image_ref()),
        env: Some(request.env_list()),
        exposed_ports: Some(exposed_ports),
        labels: Some(labels),
        host_config: Some(HostConfig {
            port_bindings: Some(port_bindings),
            auto_remove: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Map of container port to host port from an inspected port map.
fn host_ports(ports: &PortMap) -> HashMap<u16, u16> {
    ports
        .iter()
        .filter_map(|(key, bindings)| {
            let container_port = key.split('/').next()?.parse::<u16>().ok()?;
            let host_port = bindings
                .as_ref()?
                .iter()
                .find_map(|b| b.host_port.as_deref()?.parse::<u16>().ok())?;
            Some((container_port, host_port))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request() -> ProvisionRequest {
        ProvisionRequest::new("oracle", "19c")
            .with_env("ORACLE_ADMIN_PASSWORD", "secret")
            .with_port(1521, Some(1521))
            .with_port(5500, None)
    }

    #[test]
    fn test_container_config() {
        let config = container_config(&request());

        assert_eq!(config.image.as_deref(), Some("oracle:19c"));
        assert_eq!(
            config.env,
            Some(vec!["ORACLE_ADMIN_PASSWORD=secret".to_string()])
        );

        let exposed = config.exposed_ports.unwrap();
        assert!(exposed.contains_key("1521/tcp"));
        assert!(exposed.contains_key("5500/tcp"));

        let bindings = config.host_config.unwrap().port_bindings.unwrap();
        let fixed = bindings["1521/tcp"].as_ref().unwrap();
        assert_eq!(fixed[0].host_port.as_deref(), Some("1521"));
        let random = bindings["5500/tcp"].as_ref().unwrap();
        assert_eq!(random[0].host_port, None);
    }

    #[test]
    fn test_host_ports_from_inspect() {
        let mut ports: PortMap = HashMap::new();
        ports.insert(
            "1521/tcp".to_string(),
            Some(vec![DockerPortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: Some("49153".to_string()),
            }]),
        );
        ports.insert("5500/tcp".to_string(), None);
        ports.insert("bogus".to_string(), Some(vec![]));

        let mapped = host_ports(&ports);

        assert_eq!(mapped, HashMap::from([(1521, 49153)]));
    }

    #[test]
    fn test_default_pull_policy() {
        assert_eq!(PullPolicy::default(), PullPolicy::IfMissing);
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn test_provision_and_teardown() {
        let docker = Docker::connect_with_local_defaults().unwrap();
        let provisioner = DockerProvisioner::new(docker);
        let request = ProvisionRequest::new("nginx", "alpine")
            .with_env("DOCKHAND", "1")
            .with_port(80, None);

        let handle = provisioner.provision(&request).await.unwrap();
        assert!(handle.name().starts_with("dockhand-"));
        assert!(handle.host_port(80).is_some());

        provisioner.teardown(handle).await.unwrap();
    }
}
