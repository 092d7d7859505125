//! Dockhand Core
//!
//! Domain types, port traits and the lifecycle orchestrator for ephemeral,
//! containerized test dependencies. Adapters for a concrete container engine
//! or database driver live in their own crates and plug in through [`ports`].

pub mod backoff;
pub mod descriptor;
pub mod error;
pub mod lifecycle;
pub mod params;
pub mod ports;
pub mod resource;
pub mod retry;
pub mod suite;

pub use backoff::{Backoff, RetryPolicy};
pub use descriptor::{ConnectionDescriptor, ConnectionStringBuilder};
pub use error::{Error, Result};
pub use lifecycle::{Lifecycle, LifecycleState, RunReport};
pub use params::ConnectionParameters;
pub use ports::{EngineClient, Probe, Provisioner};
pub use resource::{PortBinding, ProvisionRequest, ResourceHandle};
pub use retry::{Ready, RetryConnector};
pub use suite::{RunContext, SuiteOutcome, TestSuite};
