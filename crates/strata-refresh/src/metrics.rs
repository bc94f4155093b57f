//! Observability metrics for the refresh orchestrator.
//!
//! Exposed via the `metrics` crate facade; install any compatible exporter
//! (e.g. Prometheus) at application startup.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `strata_refresh_cycles_total` | Counter | `source`, `outcome` | Cycles by trigger source and outcome |
//! | `strata_refresh_cycle_duration_seconds` | Histogram | - | Full cycle wall time |
//! | `strata_refresh_partitions_total` | Counter | `result` | Per-partition outcomes |
//! | `strata_refresh_load_duration_seconds` | Histogram | `result` | Per-partition load-and-commit time |
//! | `strata_refresh_rows_staged_total` | Counter | - | Transformed rows written to staging |
//! | `strata_refresh_reclamation_failures_total` | Counter | - | Deferred reclamations |
//! | `strata_refresh_active_jobs` | Gauge | - | In-flight load jobs |

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: cycles by trigger source and outcome.
    pub const CYCLES_TOTAL: &str = "strata_refresh_cycles_total";
    /// Histogram: full cycle wall time in seconds.
    pub const CYCLE_DURATION_SECONDS: &str = "strata_refresh_cycle_duration_seconds";
    /// Counter: per-partition outcomes.
    pub const PARTITIONS_TOTAL: &str = "strata_refresh_partitions_total";
    /// Histogram: per-partition load-and-commit time in seconds.
    pub const LOAD_DURATION_SECONDS: &str = "strata_refresh_load_duration_seconds";
    /// Counter: transformed rows written to staging.
    pub const ROWS_STAGED_TOTAL: &str = "strata_refresh_rows_staged_total";
    /// Counter: reclamations deferred to a later sweep.
    pub const RECLAMATION_FAILURES_TOTAL: &str = "strata_refresh_reclamation_failures_total";
    /// Gauge: in-flight load jobs.
    pub const ACTIVE_JOBS: &str = "strata_refresh_active_jobs";
}

/// Label keys used across metrics.
pub mod labels {
    /// Trigger source (cron, manual).
    pub const SOURCE: &str = "source";
    /// Cycle outcome (completed, aborted).
    pub const OUTCOME: &str = "outcome";
    /// Partition result (refreshed, skipped, failed).
    pub const RESULT: &str = "result";
}

/// High-level interface for recording refresh metrics.
///
/// Cheap to clone and share across worker tasks.
#[derive(Debug, Clone, Default)]
pub struct RefreshMetrics;

impl RefreshMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records a finished cycle.
    pub fn record_cycle(&self, source: &str, outcome: &str, duration: Duration) {
        counter!(
            names::CYCLES_TOTAL,
            labels::SOURCE => source.to_string(),
            labels::OUTCOME => outcome.to_string(),
        )
        .increment(1);
        histogram!(names::CYCLE_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    /// Records one partition's outcome within a cycle.
    pub fn record_partition(&self, result: &str) {
        counter!(
            names::PARTITIONS_TOTAL,
            labels::RESULT => result.to_string(),
        )
        .increment(1);
    }

    /// Records one partition's load-and-commit duration.
    pub fn observe_load_duration(&self, result: &str, duration: Duration) {
        histogram!(
            names::LOAD_DURATION_SECONDS,
            labels::RESULT => result.to_string(),
        )
        .record(duration.as_secs_f64());
    }

    /// Adds staged rows to the running total.
    pub fn add_rows_staged(&self, rows: u64) {
        counter!(names::ROWS_STAGED_TOTAL).increment(rows);
    }

    /// Records a reclamation deferred to a later sweep.
    pub fn record_reclamation_failure(&self) {
        counter!(names::RECLAMATION_FAILURES_TOTAL).increment(1);
    }

    /// Sets the number of in-flight load jobs.
    #[allow(clippy::cast_precision_loss)] // Gauge values are typically small
    pub fn set_active_jobs(&self, count: usize) {
        gauge!(names::ACTIVE_JOBS).set(count as f64);
    }
}
