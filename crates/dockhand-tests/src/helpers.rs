//! Test helper functions and utilities.

use bollard::Docker;
use dockhand_core::{ConnectionParameters, Lifecycle, ProvisionRequest, RetryPolicy};
use dockhand_docker::{DockerEngine, DockerProvisioner};
use dockhand_probe::PgProbe;
use std::net::TcpListener;
use std::sync::Arc;

/// A lifecycle wired to the local Docker engine with a PostgreSQL probe.
pub fn docker_lifecycle(
    params: ConnectionParameters,
    request: ProvisionRequest,
    policy: RetryPolicy,
) -> anyhow::Result<Lifecycle<PgProbe>> {
    let engine = DockerEngine::connect()?;
    let provisioner = DockerProvisioner::new(engine.docker().clone());
    Ok(
        Lifecycle::new(Arc::new(engine), Arc::new(provisioner), PgProbe, params, request)
            .with_retry_policy(policy)?,
    )
}

/// A free TCP port on the loopback interface.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Number of containers, running or not, whose name starts with `prefix`.
pub async fn containers_named(prefix: &str) -> anyhow::Result<usize> {
    use bollard::container::ListContainersOptions;
    use std::collections::HashMap;

    let docker = Docker::connect_with_local_defaults()?;
    let filters = HashMap::from([("name", vec![prefix])]);
    let containers = docker
        .list_containers(Some(ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        }))
        .await?;
    Ok(containers.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_port_is_bindable() {
        let port = free_port().unwrap();
        assert!(TcpListener::bind(("127.0.0.1", port)).is_ok());
    }
}
