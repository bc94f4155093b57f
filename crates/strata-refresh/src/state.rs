//! Per-partition watermark state.
//!
//! One [`PartitionState`] exists per known partition key. It is created on
//! first sighting of the key, owned exclusively by the orchestrator, and
//! mutated only through the state store's claim/release protocol so writes
//! to one key are never concurrent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strata_core::{Fingerprint, PartitionKey};

use crate::error::{Error, Result};

/// Partition status state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartitionStatus {
    /// Known but never loaded.
    Pending,
    /// A load job is in flight.
    Loading,
    /// Last load committed successfully; content is visible.
    Committed,
    /// Last load failed; previously committed content (if any) stays visible.
    Failed,
}

impl PartitionStatus {
    /// Returns true if the transition from self to target is valid.
    ///
    /// `Loading` is the only gateway to `Committed`/`Failed`; everything
    /// refreshable re-enters through `Loading`.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Pending | Self::Committed | Self::Failed => matches!(target, Self::Loading),
            Self::Loading => matches!(target, Self::Committed | Self::Failed),
        }
    }

    /// Returns true if a new load job may claim the partition.
    #[must_use]
    pub const fn is_claimable(&self) -> bool {
        !matches!(self, Self::Loading)
    }
}

impl Default for PartitionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for PartitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Loading => write!(f, "LOADING"),
            Self::Committed => write!(f, "COMMITTED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Durable per-partition record: watermark, fingerprint, and retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionState {
    /// The partition this state belongs to.
    pub key: PartitionKey,
    /// Current status.
    pub status: PartitionStatus,
    /// When the last successful load committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_load_time: Option<DateTime<Utc>>,
    /// Fingerprint of the content actually committed. Never set from an
    /// attempt that failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_fingerprint: Option<Fingerprint>,
    /// Consecutive failed attempts since the last commit.
    pub attempt_count: u32,
    /// Earliest time the next retry may run (exponential backoff across
    /// cycles).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Last failure message, surfaced in observability output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When this record was last written.
    pub updated_at: DateTime<Utc>,
}

impl PartitionState {
    /// Creates the initial state for a newly sighted partition key.
    #[must_use]
    pub fn new(key: PartitionKey) -> Self {
        Self {
            key,
            status: PartitionStatus::Pending,
            last_load_time: None,
            source_fingerprint: None,
            attempt_count: 0,
            next_retry_at: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    /// Transitions to a new status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] if the transition is invalid.
    #[tracing::instrument(skip(self), fields(partition = %self.key, from = %self.status, to = %target))]
    pub fn transition_to(&mut self, target: PartitionStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: target.to_string(),
                reason: "invalid partition status transition".into(),
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records a successful commit: resets the retry budget and advances the
    /// watermark.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition is not in `Loading` status.
    pub fn record_commit(&mut self, fingerprint: Fingerprint, now: DateTime<Utc>) -> Result<()> {
        self.transition_to(PartitionStatus::Committed)?;
        self.last_load_time = Some(now);
        self.source_fingerprint = Some(fingerprint);
        self.attempt_count = 0;
        self.next_retry_at = None;
        self.last_error = None;
        Ok(())
    }

    /// Records a failed attempt: increments the retry budget and schedules
    /// the next retry. `next_retry_at == None` means no further retry is
    /// scheduled (permanent failure or budget exhausted).
    ///
    /// # Errors
    ///
    /// Returns an error if the partition is not in `Loading` status.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.transition_to(PartitionStatus::Failed)?;
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.next_retry_at = next_retry_at;
        self.last_error = Some(error.into());
        Ok(())
    }
}
