//! Error types for Dockhand.

use crate::suite::SuiteOutcome;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Lifecycle errors
    #[error("Container engine unreachable: {0}")]
    EngineUnreachable(String),

    #[error("Provisioning {image} failed: {reason}")]
    ProvisioningFailed { image: String, reason: String },

    #[error(
        "Dependency never became ready after {attempts} attempts in {elapsed:?}: {last_error}"
    )]
    ReadinessTimeout {
        attempts: u32,
        elapsed: Duration,
        last_error: String,
    },

    #[error("Teardown of container {container} failed: {reason}")]
    TeardownFailed {
        container: String,
        reason: String,
        /// Outcome of the suite, when teardown ran after the suite finished.
        suite_outcome: Option<SuiteOutcome>,
        /// Error that forced an early teardown, if any.
        preceding: Option<Box<Error>>,
    },

    #[error("Malformed connection parameters: {0}")]
    MalformedConnectionParameters(String),

    // Probe errors
    #[error("Connection error: {0}")]
    Connection(String),

    // Configuration errors
    #[error("Invalid retry policy: {0}")]
    InvalidRetryPolicy(String),

    #[error("Run interrupted while {0}")]
    Interrupted(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a teardown error, attaching what was known when teardown ran.
    pub fn teardown_failed(
        container: impl Into<String>,
        source: Error,
        suite_outcome: Option<SuiteOutcome>,
        preceding: Option<Error>,
    ) -> Self {
        let reason = match source {
            Error::TeardownFailed { reason, .. } => reason,
            other => other.to_string(),
        };
        Error::TeardownFailed {
            container: container.into(),
            reason,
            suite_outcome,
            preceding: preceding.map(Box::new),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
