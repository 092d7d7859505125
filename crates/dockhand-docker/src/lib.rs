//! Docker engine adapter for Dockhand.
//!
//! Implements the engine and provisioner ports from `dockhand-core` on top of
//! the Docker Engine API via `bollard`.

pub mod engine;
pub mod provisioner;

pub use engine::DockerEngine;
pub use provisioner::{DockerProvisioner, PullPolicy};
