//! Provisioning requests and handles to running instances.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Default prefix for container names.
pub const DEFAULT_NAME_PREFIX: &str = "dockhand";

/// Publish a container port on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub container_port: u16,
    /// Host port, or a random free port when absent.
    #[serde(default)]
    pub host_port: Option<u16>,
}

impl PortBinding {
    /// Key used by container engines, e.g. `1521/tcp`.
    pub fn key(&self) -> String {
        format!("{}/tcp", self.container_port)
    }
}

/// What to start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub image: String,
    pub tag: String,
    /// Runtime environment of the instance.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: Vec<PortBinding>,
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
}

fn default_name_prefix() -> String {
    DEFAULT_NAME_PREFIX.to_string()
}

impl ProvisionRequest {
    pub fn new(image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            tag: tag.into(),
            env: BTreeMap::new(),
            ports: Vec::new(),
            name_prefix: default_name_prefix(),
        }
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Publish a container port.
    pub fn with_port(mut self, container_port: u16, host_port: Option<u16>) -> Self {
        self.ports.push(PortBinding {
            container_port,
            host_port,
        });
        self
    }

    /// Full image reference, `image:tag`.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    /// Environment as `KEY=value` pairs, sorted by key.
    pub fn env_list(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

/// Reference to a running instance.
///
/// Deliberately neither `Clone` nor `Copy`: teardown consumes it.
#[derive(Debug)]
pub struct ResourceHandle {
    id: String,
    name: String,
    image: String,
    host_ports: HashMap<u16, u16>,
}

impl ResourceHandle {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        image: impl Into<String>,
        host_ports: HashMap<u16, u16>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: image.into(),
            host_ports,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Host port bound to a container port.
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.host_ports.get(&container_port).copied()
    }

    pub fn host_ports(&self) -> &HashMap<u16, u16> {
        &self.host_ports
    }
}
