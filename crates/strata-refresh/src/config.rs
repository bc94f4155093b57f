//! Orchestrator configuration.
//!
//! All knobs are passed explicitly at construction; there is no ambient
//! global configuration.

use std::time::Duration;

use crate::freshness::ProbeFailurePolicy;

/// Configuration for the refresh orchestrator.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum number of partitions refreshing in parallel.
    pub max_concurrency: usize,
    /// Maximum consecutive failed attempts before a partition requires
    /// operator intervention.
    pub max_attempts: u32,
    /// Base delay for exponential retry backoff across cycles.
    pub retry_backoff_base: Duration,
    /// Upper bound on the retry backoff delay.
    pub retry_backoff_cap: Duration,
    /// What to do when a freshness probe fails.
    pub probe_failure_policy: ProbeFailurePolicy,
    /// Rows per batch handed to the staging writer.
    pub batch_size: usize,
    /// Batches buffered between the transform and write stages. Bounds the
    /// executor's in-flight memory.
    pub channel_capacity: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_attempts: 3,
            retry_backoff_base: Duration::from_secs(30),
            retry_backoff_cap: Duration::from_secs(3600),
            probe_failure_policy: ProbeFailurePolicy::default(),
            batch_size: 256,
            channel_capacity: 4,
        }
    }
}

impl RefreshConfig {
    /// Sets the maximum partition refresh concurrency.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Sets the per-partition attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the retry backoff base and cap.
    #[must_use]
    pub fn with_retry_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.retry_backoff_base = base;
        self.retry_backoff_cap = cap.max(base);
        self
    }

    /// Sets the probe failure policy.
    #[must_use]
    pub fn with_probe_failure_policy(mut self, policy: ProbeFailurePolicy) -> Self {
        self.probe_failure_policy = policy;
        self
    }

    /// Sets the staging batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Computes the backoff delay before attempt `attempt_count + 1`.
    ///
    /// Doubles per recorded failure, capped: `base * 2^(attempts - 1)`.
    #[must_use]
    pub fn backoff_for(&self, attempt_count: u32) -> Duration {
        if attempt_count == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt_count.saturating_sub(1).min(16);
        let delay = self.retry_backoff_base.saturating_mul(1 << exponent);
        delay.min(self.retry_backoff_cap)
    }
}
