//! Exponential backoff for transient chunk failures.

use std::time::Duration;

/// How often, and how patiently, a failing chunk is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed for one chunk after its first attempt fails.
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Cap for exponential growth.
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
            backoff_multiplier: 2.0,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    pub(crate) fn budget(&self) -> RetryBudget<'_> {
        RetryBudget {
            policy: self,
            failures: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Tracks consecutive failures of one chunk against a [`RetryPolicy`].
#[derive(Debug)]
pub(crate) struct RetryBudget<'a> {
    policy: &'a RetryPolicy,
    failures: u32,
}

impl RetryBudget<'_> {
    /// Records a failure. Returns the delay to wait before retrying, or `None` once exhausted.
    pub(crate) fn record_failure(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures > self.policy.max_retries {
            return None;
        }
        Some(self.policy.delay_for_retry(self.failures - 1))
    }

    /// Total attempts made so far, including the first.
    pub(crate) fn attempts(&self) -> u32 {
        self.failures
    }

    /// Progress was made, so the next failure starts a fresh budget.
    pub(crate) fn reset(&mut self) {
        self.failures = 0;
    }
}
