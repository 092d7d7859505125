//! The test-execution boundary.

use crate::descriptor::ConnectionDescriptor;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;

/// Completion signal returned by a test suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SuiteOutcome {
    Passed,
    Failed { reason: String },
    /// The suite panicked or was interrupted.
    Aborted { reason: String },
}

impl SuiteOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        SuiteOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        SuiteOutcome::Aborted {
            reason: reason.into(),
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, SuiteOutcome::Passed)
    }
}

/// Everything a suite needs, passed explicitly instead of through globals.
///
/// Owns the live connection; dropping the context releases it.
#[derive(Debug)]
pub struct RunContext<C> {
    connection: C,
    descriptor: ConnectionDescriptor,
    container_id: String,
    host_ports: HashMap<u16, u16>,
}

impl<C> RunContext<C> {
    pub fn new(
        connection: C,
        descriptor: ConnectionDescriptor,
        container_id: impl Into<String>,
        host_ports: HashMap<u16, u16>,
    ) -> Self {
        Self {
            connection,
            descriptor,
            container_id: container_id.into(),
            host_ports,
        }
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Take ownership of the connection.
    pub fn into_connection(self) -> C {
        self.connection
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Host port bound to a container port.
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.host_ports.get(&container_port).copied()
    }
}

/// A test suite run against a ready dependency.
///
/// Implemented for any `FnOnce(RunContext<C>) -> impl Future<Output = SuiteOutcome>`.
pub trait TestSuite<C>: Send {
    fn run(self, ctx: RunContext<C>) -> impl Future<Output = SuiteOutcome> + Send;
}

impl<C, F, Fut> TestSuite<C> for F
where
    F: FnOnce(RunContext<C>) -> Fut + Send,
    Fut: Future<Output = SuiteOutcome> + Send,
{
    fn run(self, ctx: RunContext<C>) -> impl Future<Output = SuiteOutcome> + Send {
        self(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(SuiteOutcome::failed("boom")).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "boom");
        assert!(SuiteOutcome::Passed.is_passed());
        assert!(!SuiteOutcome::aborted("x").is_passed());
    }
}
