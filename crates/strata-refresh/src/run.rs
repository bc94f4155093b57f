//! Refresh cycle bookkeeping.
//!
//! One [`RunRecord`] is appended to the run log per orchestration cycle,
//! whether the cycle completed or aborted. The richer [`CycleReport`] adds
//! per-partition outcomes for callers that drive cycles programmatically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strata_core::{PartitionKey, RunId};

use crate::freshness::SkipReason;

/// What initiated a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerSource {
    /// Cron/schedule-based tick.
    Cron,
    /// Operator-initiated run.
    Manual,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cron => write!(f, "cron"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// How a cycle was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTrigger {
    /// Trigger source.
    pub source: TriggerSource,
    /// When true, bypasses the staleness check for all enumerated partitions.
    pub force: bool,
    /// Trigger timestamp.
    pub requested_at: DateTime<Utc>,
}

impl RunTrigger {
    /// Creates a cron trigger.
    #[must_use]
    pub fn cron() -> Self {
        Self {
            source: TriggerSource::Cron,
            force: false,
            requested_at: Utc::now(),
        }
    }

    /// Creates a manual trigger.
    #[must_use]
    pub fn manual(force: bool) -> Self {
        Self {
            source: TriggerSource::Manual,
            force,
            requested_at: Utc::now(),
        }
    }

    /// Coalesces another trigger into this one.
    ///
    /// Triggers arriving while a cycle runs collapse to a single pending
    /// re-run; a forced request is never downgraded by the merge.
    pub fn coalesce(&mut self, other: Self) {
        self.force |= other.force;
        if other.source == TriggerSource::Manual {
            self.source = TriggerSource::Manual;
        }
        self.requested_at = self.requested_at.max(other.requested_at);
    }
}

/// Terminal outcome of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    /// The cycle ran to completion (individual partitions may have failed).
    Completed,
    /// The cycle aborted before touching any partition (enumeration or
    /// state store failure).
    Aborted,
}

/// One entry in the append-only run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Unique cycle identifier.
    pub id: RunId,
    /// What triggered the cycle.
    pub trigger_source: TriggerSource,
    /// Whether the staleness check was bypassed.
    pub force: bool,
    /// When the cycle started.
    pub started_at: DateTime<Utc>,
    /// When the cycle finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Terminal outcome.
    pub outcome: RunOutcome,
    /// Partitions enumerated this cycle.
    pub partitions_considered: usize,
    /// Partitions loaded and committed this cycle.
    pub partitions_refreshed: usize,
    /// Partitions whose load or commit failed this cycle.
    pub partitions_failed: usize,
    /// Partitions skipped as fresh (or retry-gated) this cycle.
    pub partitions_skipped: usize,
    /// Cycle-level error, for aborted cycles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    /// Creates a record for a cycle that is starting now.
    #[must_use]
    pub fn begin(trigger: RunTrigger) -> Self {
        Self {
            id: RunId::generate(),
            trigger_source: trigger.source,
            force: trigger.force,
            started_at: Utc::now(),
            finished_at: None,
            outcome: RunOutcome::Completed,
            partitions_considered: 0,
            partitions_refreshed: 0,
            partitions_failed: 0,
            partitions_skipped: 0,
            error: None,
        }
    }

    /// Marks the cycle aborted with a cycle-level error.
    pub fn abort(&mut self, error: impl Into<String>) {
        self.outcome = RunOutcome::Aborted;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    /// Marks the cycle finished.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

/// Outcome of one partition within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionOutcome {
    /// Loaded and committed.
    Refreshed {
        /// Rows written to the new content.
        rows_written: u64,
    },
    /// Left untouched.
    Skipped(SkipReason),
    /// Load or commit failed; previously committed content stays visible.
    Failed {
        /// Failure description.
        error: String,
        /// Whether a retry is scheduled for a later cycle.
        will_retry: bool,
    },
}

/// Full result of one cycle: the durable record plus per-partition detail.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// The run log entry for this cycle.
    pub record: RunRecord,
    /// Per-partition outcomes in enumeration order.
    pub partitions: Vec<(PartitionKey, PartitionOutcome)>,
}

impl CycleReport {
    /// Returns the outcome for one partition, if it was considered.
    #[must_use]
    pub fn outcome_of(&self, key: &PartitionKey) -> Option<&PartitionOutcome> {
        self.partitions
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, outcome)| outcome)
    }
}
