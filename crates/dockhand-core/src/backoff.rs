//! Exponential backoff schedule for readiness polling.

use crate::{Error, Result};
use std::time::Duration;

/// Bounds and growth of the readiness retry loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the second attempt.
    pub initial_interval: Duration,
    /// Growth factor applied after each failed attempt.
    pub multiplier: f64,
    /// Upper bound for a single delay.
    pub max_interval: Duration,
    /// Total time budget across all attempts.
    pub max_elapsed: Option<Duration>,
    /// Maximum number of attempts.
    pub max_attempts: Option<u32>,
    /// Time allowed for a single open-and-verify attempt.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(5),
            max_elapsed: Some(Duration::from_secs(60)),
            max_attempts: None,
            attempt_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl RetryPolicy {
    /// Set the total time budget.
    pub fn with_max_elapsed(mut self, budget: Duration) -> Self {
        self.max_elapsed = Some(budget);
        self
    }

    /// Set the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set the initial delay and growth factor.
    pub fn with_intervals(mut self, initial: Duration, multiplier: f64, max: Duration) -> Self {
        self.initial_interval = initial;
        self.multiplier = multiplier;
        self.max_interval = max;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Reject policies that could loop forever or shrink between attempts.
    pub fn validate(&self) -> Result<()> {
        if self.max_elapsed.is_none() && self.max_attempts.is_none() {
            return Err(Error::InvalidRetryPolicy(
                "either max_elapsed or max_attempts must be set".to_string(),
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(Error::InvalidRetryPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::InvalidRetryPolicy(format!(
                "multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.initial_interval.is_zero() || self.initial_interval > self.max_interval {
            return Err(Error::InvalidRetryPolicy(format!(
                "initial interval {:?} must be non-zero and at most {:?}",
                self.initial_interval, self.max_interval
            )));
        }
        Ok(())
    }

    /// Delay schedule for this policy.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            next: self.initial_interval,
            multiplier: self.multiplier,
            max_interval: self.max_interval,
        }
    }
}

/// Infinite, non-decreasing sequence of delays capped at `max_interval`.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    multiplier: f64,
    max_interval: Duration,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next.min(self.max_interval);
        self.next = current.mul_f64(self.multiplier).min(self.max_interval);
        Some(current)
    }
}
