//! Command handlers.

use crate::config::{DockhandConfig, ProbeKind};
use crate::suite::CommandSuite;
use anyhow::{Context, bail};
use dockhand_core::{
    ConnectionStringBuilder, EngineClient, Error, Lifecycle, Probe, ProvisionRequest, RunReport,
};
use dockhand_docker::{DockerEngine, DockerProvisioner};
use dockhand_probe::{PgProbe, TcpProbe};
use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Exit status when the instance could not be removed.
const EXIT_TEARDOWN_FAILED: u8 = 2;

pub async fn run(config: &DockhandConfig, command: Vec<String>, json: bool) -> anyhow::Result<ExitCode> {
    let command = if command.is_empty() {
        config.suite.command.clone()
    } else {
        command
    };
    let Some(suite) = CommandSuite::new(&command, config.suite.descriptor_env.clone()) else {
        bail!("no test command given: pass one after `--` or set suite.command");
    };

    let request = config.provision_request()?;
    let shutdown = interrupt_signal();

    let result = match config.suite.probe {
        ProbeKind::Tcp => {
            run_with_probe(config, request, TcpProbe::default(), suite, shutdown).await
        }
        ProbeKind::Postgres => run_with_probe(config, request, PgProbe, suite, shutdown).await,
    };

    match &result {
        Ok(report) => print_report(report, json)?,
        Err(e @ Error::TeardownFailed { suite_outcome, .. }) => {
            error!(error = %e, "Ephemeral instance was not removed");
            if let Some(outcome) = suite_outcome {
                info!(outcome = ?outcome, "Test suite outcome before teardown failure");
            }
        }
        Err(e) => error!(error = %e, "Run failed"),
    }
    Ok(ExitCode::from(exit_status(&result)))
}

/// Exit status for a finished run: the report's code, 2 when the instance
/// may have leaked, 1 for any other failure.
fn exit_status(result: &dockhand_core::Result<RunReport>) -> u8 {
    match result {
        Ok(report) => report.exit_code() as u8,
        Err(Error::TeardownFailed { .. }) => EXIT_TEARDOWN_FAILED,
        Err(_) => 1,
    }
}

/// Completes on the first Ctrl-C.
///
/// The listener is installed right away, so an interrupt during image pull
/// or provisioning is seen once the lifecycle next checks for it.
fn interrupt_signal() -> impl Future<Output = ()> + Send + 'static {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, tearing down");
                let _ = tx.send(());
            }
            Err(e) => warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    });
    async move {
        if rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn run_with_probe<P: Probe>(
    config: &DockhandConfig,
    request: ProvisionRequest,
    probe: P,
    suite: CommandSuite,
    shutdown: impl Future<Output = ()> + Send,
) -> dockhand_core::Result<RunReport> {
    let engine = DockerEngine::connect()?;
    let provisioner = DockerProvisioner::new(engine.docker().clone())
        .with_pull_policy(config.container.pull_policy);

    let mut lifecycle = Lifecycle::new(
        Arc::new(engine),
        Arc::new(provisioner),
        probe,
        config.connection.clone(),
        request,
    )
    .with_retry_policy(config.retry_policy())?;

    lifecycle.run_until(suite, shutdown).await
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!(
            "{:?} after {} readiness attempt(s)",
            report.outcome, report.attempts
        );
    }
    Ok(())
}

pub fn descriptor(config: &DockhandConfig, show_secret: bool) -> anyhow::Result<()> {
    let descriptor = ConnectionStringBuilder::build(&config.connection)
        .context("could not build connection descriptor")?;
    if show_secret {
        println!("{}", descriptor);
    } else {
        println!("{}", descriptor.redacted());
    }
    Ok(())
}

pub async fn ping() -> anyhow::Result<()> {
    let engine = DockerEngine::connect()?;
    engine.ping().await?;
    println!("Docker engine reachable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockhand_core::{LifecycleState, SuiteOutcome};
    use std::time::Duration;

    fn report(outcome: SuiteOutcome) -> RunReport {
        RunReport {
            outcome,
            attempts: 1,
            history: vec![LifecycleState::Idle, LifecycleState::TornDown],
        }
    }

    #[test]
    fn test_exit_status_follows_report() {
        assert_eq!(exit_status(&Ok(report(SuiteOutcome::Passed))), 0);
        assert_eq!(exit_status(&Ok(report(SuiteOutcome::failed("1 failed")))), 1);
        assert_eq!(exit_status(&Ok(report(SuiteOutcome::aborted("interrupted")))), 1);
    }

    #[test]
    fn test_teardown_failure_after_passing_suite_exits_2() {
        let err = Error::teardown_failed(
            "c0ffee",
            Error::Internal("daemon went away".into()),
            Some(SuiteOutcome::Passed),
            None,
        );
        assert_eq!(exit_status(&Err(err)), 2);
    }

    #[test]
    fn test_other_failures_exit_1() {
        let timeout = Error::ReadinessTimeout {
            attempts: 5,
            elapsed: Duration::from_secs(60),
            last_error: "connection refused".into(),
        };
        assert_eq!(exit_status(&Err(timeout)), 1);
        assert_eq!(exit_status(&Err(Error::EngineUnreachable("down".into()))), 1);
        assert_eq!(exit_status(&Err(Error::Interrupted("provisioning".into()))), 1);
    }
}
