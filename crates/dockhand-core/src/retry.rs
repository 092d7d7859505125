//! Bounded readiness polling.
//!
//! A container engine reports an instance as started well before the service
//! inside accepts connections. [`RetryConnector`] polls a [`Probe`] on an
//! exponential schedule until the probe succeeds or the policy's budget is
//! spent.

use crate::backoff::RetryPolicy;
use crate::descriptor::ConnectionDescriptor;
use crate::ports::Probe;
use crate::{Error, Result};
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

/// A verified connection and how long it took to get it.
#[derive(Debug)]
pub struct Ready<C> {
    pub connection: C,
    pub attempts: u32,
    /// Delays slept between attempts, in order.
    pub delays: Vec<Duration>,
    pub elapsed: Duration,
}

/// Polls a probe until the dependency answers.
#[derive(Debug, Clone, Default)]
pub struct RetryConnector {
    policy: RetryPolicy,
}

impl RetryConnector {
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Attempt `probe` until it succeeds or the budget is exhausted.
    pub async fn connect<P>(
        &self,
        descriptor: &ConnectionDescriptor,
        probe: &P,
    ) -> Result<Ready<P::Connection>>
    where
        P: Probe + ?Sized,
    {
        let start = Instant::now();
        let mut schedule = self.policy.backoff();
        let mut delays = Vec::new();
        let mut attempts = 0u32;

        info!(descriptor = %descriptor.redacted(), "Waiting for dependency to accept connections");

        loop {
            attempts += 1;

            let last_error = match self.attempt(descriptor, probe).await {
                Ok(connection) => {
                    let elapsed = start.elapsed();
                    info!(
                        attempts,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Dependency is ready"
                    );
                    return Ok(Ready {
                        connection,
                        attempts,
                        delays,
                        elapsed,
                    });
                }
                Err(e) => e.to_string(),
            };

            let delay = schedule.next().unwrap_or(self.policy.max_interval);
            let elapsed = start.elapsed();

            let attempts_spent = self.policy.max_attempts.is_some_and(|max| attempts >= max);
            let time_spent = self
                .policy
                .max_elapsed
                .is_some_and(|budget| elapsed + delay > budget);

            if attempts_spent || time_spent {
                warn!(
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %last_error,
                    "Retry budget exhausted"
                );
                return Err(Error::ReadinessTimeout {
                    attempts,
                    elapsed,
                    last_error,
                });
            }

            debug!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "Dependency not ready, backing off"
            );
            sleep(delay).await;
            delays.push(delay);
        }
    }

    /// One open-and-verify round. A connection that opened but failed
    /// verification is released before returning.
    async fn attempt<P>(&self, descriptor: &ConnectionDescriptor, probe: &P) -> Result<P::Connection>
    where
        P: Probe + ?Sized,
    {
        let round = open_and_verify(descriptor, probe);

        match self.policy.attempt_timeout {
            Some(limit) => timeout(limit, round).await.map_err(|_| {
                Error::Connection(format!("attempt timed out after {limit:?}"))
            })?,
            None => round.await,
        }
    }
}

async fn open_and_verify<P>(descriptor: &ConnectionDescriptor, probe: &P) -> Result<P::Connection>
where
    P: Probe + ?Sized,
{
    let mut connection = probe.open(descriptor).await?;
    match probe.verify(&mut connection).await {
        Ok(()) => Ok(connection),
        Err(e) => {
            probe.release(connection).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectionParameters;
    use crate::descriptor::ConnectionStringBuilder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` verifications.
    struct FlakyProbe {
        failures: u32,
        opened: AtomicU32,
        released: AtomicU32,
    }

    impl FlakyProbe {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                opened: AtomicU32::new(0),
                released: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Probe for FlakyProbe {
        type Connection = u32;

        async fn open(&self, _descriptor: &ConnectionDescriptor) -> Result<u32> {
            Ok(self.opened.fetch_add(1, Ordering::SeqCst) + 1)
        }

        async fn verify(&self, connection: &mut u32) -> Result<()> {
            if *connection <= self.failures {
                Err(Error::Connection("ORA-12514: listener not ready".into()))
            } else {
                Ok(())
            }
        }

        async fn release(&self, _connection: u32) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Never finishes opening.
    struct HangingProbe;

    #[async_trait]
    impl Probe for HangingProbe {
        type Connection = ();

        async fn open(&self, _descriptor: &ConnectionDescriptor) -> Result<()> {
            std::future::pending().await
        }

        async fn verify(&self, _connection: &mut ()) -> Result<()> {
            Ok(())
        }

        async fn release(&self, _connection: ()) {}
    }

    fn descriptor() -> ConnectionDescriptor {
        ConnectionStringBuilder::build(&ConnectionParameters::new(
            "localhost",
            1521,
            "orclpdb1",
            "admin",
            "secret",
        ))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let probe = FlakyProbe::new(4);
        let connector = RetryConnector::new(RetryPolicy::default()).unwrap();

        let ready = connector.connect(&descriptor(), &probe).await.unwrap();

        assert_eq!(ready.connection, 5);
        assert_eq!(ready.attempts, 5);
        assert_eq!(ready.delays.len(), 4);
        assert!(ready.delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(probe.released.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_does_not_sleep() {
        let probe = FlakyProbe::new(0);
        let connector = RetryConnector::default();

        let ready = connector.connect(&descriptor(), &probe).await.unwrap();

        assert_eq!(ready.attempts, 1);
        assert!(ready.delays.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_exhausted() {
        let probe = FlakyProbe::new(u32::MAX);
        let connector = RetryConnector::new(RetryPolicy {
            max_elapsed: None,
            max_attempts: Some(3),
            ..Default::default()
        })
        .unwrap();

        let err = connector.connect(&descriptor(), &probe).await.unwrap_err();

        match err {
            Error::ReadinessTimeout {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("ORA-12514"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(probe.released.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_budget_exhausted() {
        let probe = FlakyProbe::new(u32::MAX);
        let connector =
            RetryConnector::new(RetryPolicy::default().with_max_elapsed(Duration::from_secs(10)))
                .unwrap();

        let err = connector.connect(&descriptor(), &probe).await.unwrap_err();

        match err {
            Error::ReadinessTimeout { elapsed, .. } => {
                assert!(elapsed <= Duration::from_secs(10));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_attempt_is_bounded() {
        let connector = RetryConnector::new(
            RetryPolicy::default()
                .with_max_attempts(2)
                .with_attempt_timeout(Some(Duration::from_secs(1))),
        )
        .unwrap();

        let err = connector
            .connect(&descriptor(), &HangingProbe)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ReadinessTimeout { attempts: 2, .. }));
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let policy = RetryPolicy {
            max_elapsed: None,
            max_attempts: None,
            ..Default::default()
        };
        assert!(RetryConnector::new(policy).is_err());
    }
}
