//! Lifecycle orchestration.
//!
//! Sequences engine verification, provisioning and readiness polling, hands
//! the live connection to a test suite, and releases the instance on every
//! exit path once it exists.

use crate::backoff::RetryPolicy;
use crate::descriptor::{ConnectionDescriptor, ConnectionStringBuilder};
use crate::params::ConnectionParameters;
use crate::ports::{EngineClient, Probe, Provisioner};
use crate::resource::{ProvisionRequest, ResourceHandle};
use crate::retry::RetryConnector;
use crate::suite::{RunContext, SuiteOutcome, TestSuite};
use crate::{Error, Result};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// States of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    EngineVerified,
    Provisioned,
    Ready,
    Running,
    TornDown,
    Failed,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::TornDown | LifecycleState::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::EngineVerified => "engine_verified",
            LifecycleState::Provisioned => "provisioned",
            LifecycleState::Ready => "ready",
            LifecycleState::Running => "running",
            LifecycleState::TornDown => "torn_down",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a run whose teardown succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: SuiteOutcome,
    /// Readiness attempts before the dependency answered.
    pub attempts: u32,
    pub history: Vec<LifecycleState>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.outcome.is_passed()
    }

    /// Process exit code for this report.
    pub fn exit_code(&self) -> i32 {
        if self.passed() { 0 } else { 1 }
    }
}

/// Drives one ephemeral dependency through its lifecycle.
pub struct Lifecycle<P: Probe> {
    engine: Arc<dyn EngineClient>,
    provisioner: Arc<dyn Provisioner>,
    probe: P,
    params: ConnectionParameters,
    request: ProvisionRequest,
    connector: RetryConnector,
    history: Vec<LifecycleState>,
}

impl<P: Probe> Lifecycle<P> {
    pub fn new(
        engine: Arc<dyn EngineClient>,
        provisioner: Arc<dyn Provisioner>,
        probe: P,
        params: ConnectionParameters,
        request: ProvisionRequest,
    ) -> Self {
        Self {
            engine,
            provisioner,
            probe,
            params,
            request,
            connector: RetryConnector::default(),
            history: vec![LifecycleState::Idle],
        }
    }

    /// Use a custom readiness policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Result<Self> {
        self.connector = RetryConnector::new(policy)?;
        Ok(self)
    }

    pub fn state(&self) -> LifecycleState {
        self.history
            .last()
            .copied()
            .unwrap_or(LifecycleState::Idle)
    }

    /// Every state visited so far, starting with `Idle`.
    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    /// Run `suite` against a freshly provisioned dependency.
    ///
    /// Teardown runs exactly once whenever provisioning succeeded, whether the
    /// readiness wait fails, the suite fails, or the suite panics. A failed
    /// teardown is returned as [`Error::TeardownFailed`] even when the suite
    /// passed. Dropping the returned future after provisioning spawns the
    /// teardown on the current runtime.
    pub async fn run<S>(&mut self, suite: S) -> Result<RunReport>
    where
        S: TestSuite<P::Connection>,
    {
        self.run_until(suite, std::future::pending()).await
    }

    /// Like [`run`](Self::run), but stops early once `shutdown` completes.
    ///
    /// Before provisioning the run fails with [`Error::Interrupted`]. Once an
    /// instance exists it is torn down first; an interrupted suite is dropped
    /// and reported as [`SuiteOutcome::Aborted`].
    pub async fn run_until<S, F>(&mut self, suite: S, shutdown: F) -> Result<RunReport>
    where
        S: TestSuite<P::Connection>,
        F: Future<Output = ()> + Send,
    {
        if self.state() != LifecycleState::Idle {
            return Err(Error::Internal(format!(
                "lifecycle already ran (state: {})",
                self.state()
            )));
        }
        let mut shutdown = pin!(shutdown);

        // Rejected before the engine is contacted.
        if let Err(e) = ConnectionStringBuilder::build(&self.params) {
            return Err(self.fail(e));
        }

        let pinged = tokio::select! {
            result = self.engine.ping() => Some(result),
            _ = shutdown.as_mut() => None,
        };
        match pinged {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                let e = match e {
                    Error::EngineUnreachable(_) => e,
                    other => Error::EngineUnreachable(other.to_string()),
                };
                return Err(self.fail(e));
            }
            None => return Err(self.fail(interrupted("verifying the engine"))),
        }
        self.transition(LifecycleState::EngineVerified);

        // Not raced against shutdown: an abandoned create can leave an
        // instance nobody holds a handle to.
        let handle = match self.provisioner.provision(&self.request).await {
            Ok(handle) => handle,
            Err(e) => {
                let e = match e {
                    Error::ProvisioningFailed { .. } => e,
                    other => Error::ProvisioningFailed {
                        image: self.request.image_ref(),
                        reason: other.to_string(),
                    },
                };
                return Err(self.fail(e));
            }
        };
        info!(container = %handle.id(), name = %handle.name(), "Ephemeral instance started");
        self.transition(LifecycleState::Provisioned);

        let host_ports = handle.host_ports().clone();
        let guard = TeardownGuard::new(self.provisioner.clone(), handle);

        if shutdown.as_mut().now_or_never().is_some() {
            return Err(self.abort_provisioned(guard, interrupted("provisioning")).await);
        }

        let descriptor = match self.published_descriptor(&host_ports) {
            Ok(descriptor) => descriptor,
            Err(e) => return Err(self.abort_provisioned(guard, e).await),
        };

        let connected = tokio::select! {
            result = self.connector.connect(&descriptor, &self.probe) => Some(result),
            _ = shutdown.as_mut() => None,
        };
        let ready = match connected {
            Some(Ok(ready)) => ready,
            Some(Err(e)) => return Err(self.abort_provisioned(guard, e).await),
            None => {
                let e = interrupted("waiting for readiness");
                return Err(self.abort_provisioned(guard, e).await);
            }
        };
        self.transition(LifecycleState::Ready);

        let attempts = ready.attempts;
        let container = guard.container().to_string();
        let ctx = RunContext::new(ready.connection, descriptor, container.clone(), host_ports);
        self.transition(LifecycleState::Running);

        let outcome = tokio::select! {
            outcome = run_suite(suite, ctx) => outcome,
            _ = shutdown.as_mut() => {
                warn!(container = %container, "Interrupted, abandoning test suite");
                SuiteOutcome::aborted("interrupted")
            }
        };

        match guard.teardown().await {
            Ok(()) => {
                info!(container = %container, outcome = ?outcome, "Ephemeral instance removed");
                self.transition(LifecycleState::TornDown);
                Ok(RunReport {
                    outcome,
                    attempts,
                    history: self.history.clone(),
                })
            }
            Err(e) => {
                error!(
                    container = %container,
                    error = %e,
                    outcome = ?outcome,
                    "Teardown failed, instance may be leaked"
                );
                Err(self.fail(Error::teardown_failed(container, e, Some(outcome), None)))
            }
        }
    }

    /// Descriptor for the running instance. When the instance publishes the
    /// connection port, the host side of that binding is dialled instead.
    fn published_descriptor(&self, host_ports: &HashMap<u16, u16>) -> Result<ConnectionDescriptor> {
        let mut params = self.params.clone();
        if let Some(&host_port) = host_ports.get(&self.params.port) {
            if host_port != params.port {
                debug!(
                    container_port = params.port,
                    host_port, "Connection port published on a different host port"
                );
            }
            params.port = host_port;
        }
        ConnectionStringBuilder::build(&params)
    }

    /// Release the instance after a failure that followed provisioning.
    async fn abort_provisioned(&mut self, guard: TeardownGuard, cause: Error) -> Error {
        let container = guard.container().to_string();
        warn!(container = %container, error = %cause, "Tearing down after failure");
        match guard.teardown().await {
            Ok(()) => self.fail(cause),
            Err(e) => {
                error!(container = %container, error = %e, "Teardown failed, instance may be leaked");
                self.fail(Error::teardown_failed(container, e, None, Some(cause)))
            }
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        info!(from = %self.state(), to = %next, "Lifecycle transition");
        self.history.push(next);
    }

    fn fail(&mut self, e: Error) -> Error {
        self.transition(LifecycleState::Failed);
        e
    }
}

/// Owns a provisioned instance until it is torn down.
///
/// If the guard is dropped while still holding the instance, e.g. because the
/// run future was cancelled, the teardown is spawned on the current runtime.
struct TeardownGuard {
    provisioner: Arc<dyn Provisioner>,
    container: String,
    handle: Option<ResourceHandle>,
}

impl TeardownGuard {
    fn new(provisioner: Arc<dyn Provisioner>, handle: ResourceHandle) -> Self {
        Self {
            provisioner,
            container: handle.id().to_string(),
            handle: Some(handle),
        }
    }

    fn container(&self) -> &str {
        &self.container
    }

    async fn teardown(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => self.provisioner.teardown(handle).await,
            None => Ok(()),
        }
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(container = %self.container, "Run dropped outside a runtime, instance leaked");
            return;
        };

        warn!(container = %self.container, "Run cancelled, tearing down in the background");
        let provisioner = Arc::clone(&self.provisioner);
        let container = self.container.clone();
        runtime.spawn(async move {
            match provisioner.teardown(handle).await {
                Ok(()) => info!(container = %container, "Ephemeral instance removed"),
                Err(e) => {
                    error!(container = %container, error = %e, "Teardown failed, instance may be leaked")
                }
            }
        });
    }
}

async fn run_suite<C, S>(suite: S, ctx: RunContext<C>) -> SuiteOutcome
where
    S: TestSuite<C>,
{
    match AssertUnwindSafe(suite.run(ctx)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => {
            let reason = panic_message(&*payload);
            warn!(reason = %reason, "Test suite panicked");
            SuiteOutcome::aborted(reason)
        }
    }
}

fn interrupted(phase: &str) -> Error {
    Error::Interrupted(phase.to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "test suite panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(LifecycleState::TornDown.is_terminal());
        assert!(LifecycleState::Failed.is_terminal());
        assert!(!LifecycleState::Running.is_terminal());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(&*payload), "test suite panicked");
    }

    #[test]
    fn test_report_exit_code() {
        let report = RunReport {
            outcome: SuiteOutcome::failed("assertion"),
            attempts: 1,
            history: vec![],
        };
        assert_eq!(report.exit_code(), 1);
    }
}
