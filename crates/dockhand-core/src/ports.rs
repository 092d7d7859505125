//! Port traits (hexagonal architecture).
//!
//! These traits define the boundaries between the lifecycle orchestrator and
//! the container engine and database driver adapters.

use crate::descriptor::ConnectionDescriptor;
use crate::resource::{ProvisionRequest, ResourceHandle};
use crate::Result;
use async_trait::async_trait;

/// Handle to a container engine.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Single liveness probe against the engine.
    async fn ping(&self) -> Result<()>;
}

/// Starts and removes ephemeral instances.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Start an instance. Returns once the engine reports it started, which
    /// says nothing about whether the service inside accepts connections.
    async fn provision(&self, request: &ProvisionRequest) -> Result<ResourceHandle>;

    /// Stop and remove an instance. Consumes the handle.
    async fn teardown(&self, handle: ResourceHandle) -> Result<()>;
}

/// Opens and checks a connection to the dependency.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Live connection handed to the suite once verified.
    type Connection: Send + 'static;

    /// Open a connection.
    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Self::Connection>;

    /// Check that an open connection is usable. What that takes is up to the
    /// probe: a driver ping, or just confirming the peer kept it open.
    async fn verify(&self, connection: &mut Self::Connection) -> Result<()>;

    /// Release a connection that failed verification.
    async fn release(&self, connection: Self::Connection);
}
