//! Staleness decisions.
//!
//! The evaluator decides, per enumerated partition, whether a refresh is
//! required. It consults the recorded partition state and, only when the
//! decision actually needs one, a cheap source probe. Retry gating happens
//! here too: a failed partition is only retried once its backoff window has
//! elapsed and its attempt budget remains.

use chrono::{DateTime, Utc};

use strata_core::{Fingerprint, PartitionKey};

use crate::source::Source;
use crate::state::{PartitionState, PartitionStatus};

/// What to do when a freshness probe fails.
///
/// The incremental strategy depends on probes; when one fails the system
/// must either refresh anyway (favoring correctness over skipping a needed
/// refresh) or trust the last commit (favoring cost). This is an explicit,
/// configurable policy rather than a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeFailurePolicy {
    /// Treat the partition as stale and refresh it.
    #[default]
    AssumeStale,
    /// Treat the partition as fresh and skip it.
    AssumeFresh,
}

/// Why a partition was selected for refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// No state recorded for this key.
    FirstLoad,
    /// The source fingerprint differs from the committed one.
    FingerprintChanged,
    /// The trigger carried `force`.
    Forced,
    /// A failed attempt is due for retry.
    Retry,
    /// The probe failed and policy says assume stale.
    ProbeFailedAssumedStale,
}

impl std::fmt::Display for RefreshReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirstLoad => write!(f, "first_load"),
            Self::FingerprintChanged => write!(f, "fingerprint_changed"),
            Self::Forced => write!(f, "forced"),
            Self::Retry => write!(f, "retry"),
            Self::ProbeFailedAssumedStale => write!(f, "probe_failed_assumed_stale"),
        }
    }
}

/// Why a partition was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Source content unchanged since last commit.
    Unchanged,
    /// A failed attempt exists but its backoff window has not elapsed.
    RetryBackoff,
    /// The attempt budget is exhausted; operator intervention required.
    RetriesExhausted,
    /// The probe failed and policy says assume fresh.
    ProbeFailedAssumedFresh,
    /// Another load job already holds the key.
    InFlight,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unchanged => write!(f, "unchanged"),
            Self::RetryBackoff => write!(f, "retry_backoff"),
            Self::RetriesExhausted => write!(f, "retries_exhausted"),
            Self::ProbeFailedAssumedFresh => write!(f, "probe_failed_assumed_fresh"),
            Self::InFlight => write!(f, "in_flight"),
        }
    }
}

/// The evaluator's verdict for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// Refresh required.
    Refresh {
        /// Why the refresh is required.
        reason: RefreshReason,
        /// The probed fingerprint, when the decision produced one. The
        /// executor re-probes when absent.
        fingerprint: Option<Fingerprint>,
    },
    /// Partition is fresh (or gated); leave it untouched.
    Skip(SkipReason),
}

impl Staleness {
    /// Returns true if the verdict is a refresh.
    #[must_use]
    pub const fn is_refresh(&self) -> bool {
        matches!(self, Self::Refresh { .. })
    }
}

/// Decides whether a partition needs a refresh.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessEvaluator {
    policy: ProbeFailurePolicy,
    max_attempts: u32,
}

impl FreshnessEvaluator {
    /// Creates a new evaluator.
    #[must_use]
    pub const fn new(policy: ProbeFailurePolicy, max_attempts: u32) -> Self {
        Self {
            policy,
            max_attempts,
        }
    }

    /// Evaluates one partition.
    ///
    /// Probes the source only when the decision needs a fingerprint: gated
    /// retries, forced refreshes, and first loads are decided without any
    /// source call, preserving the cheap-skip property.
    pub async fn evaluate(
        &self,
        source: &dyn Source,
        key: &PartitionKey,
        state: Option<&PartitionState>,
        force: bool,
        now: DateTime<Utc>,
    ) -> Staleness {
        // Retry gating comes first: a partition out of budget stays failed
        // until an operator forces it.
        if let Some(state) = state {
            if state.status == PartitionStatus::Failed && !force {
                if state.attempt_count >= self.max_attempts {
                    return Staleness::Skip(SkipReason::RetriesExhausted);
                }
                if state.next_retry_at.is_some_and(|at| at > now) {
                    return Staleness::Skip(SkipReason::RetryBackoff);
                }
                return Staleness::Refresh {
                    reason: RefreshReason::Retry,
                    fingerprint: None,
                };
            }
        }

        if force {
            return Staleness::Refresh {
                reason: RefreshReason::Forced,
                fingerprint: None,
            };
        }

        let Some(state) = state else {
            return Staleness::Refresh {
                reason: RefreshReason::FirstLoad,
                fingerprint: None,
            };
        };

        let Some(committed) = state.source_fingerprint.as_ref() else {
            // Known key that never committed (Pending).
            return Staleness::Refresh {
                reason: RefreshReason::FirstLoad,
                fingerprint: None,
            };
        };

        match source.probe(key).await {
            Ok(fingerprint) if &fingerprint == committed => Staleness::Skip(SkipReason::Unchanged),
            Ok(fingerprint) => Staleness::Refresh {
                reason: RefreshReason::FingerprintChanged,
                fingerprint: Some(fingerprint),
            },
            Err(err) => {
                tracing::warn!(partition = %key, error = %err, policy = ?self.policy, "freshness probe failed");
                match self.policy {
                    ProbeFailurePolicy::AssumeStale => Staleness::Refresh {
                        reason: RefreshReason::ProbeFailedAssumedStale,
                        fingerprint: None,
                    },
                    ProbeFailurePolicy::AssumeFresh => {
                        Staleness::Skip(SkipReason::ProbeFailedAssumedFresh)
                    }
                }
            }
        }
    }
}
