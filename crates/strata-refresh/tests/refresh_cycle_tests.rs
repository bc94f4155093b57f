//! End-to-end cycle behavior: incremental skips, failure isolation, retry
//! budgets, and probe failure policies.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use strata_core::PartitionKey;
use strata_refresh::config::RefreshConfig;
use strata_refresh::engine::{MemoryEngine, StorageEngine};
use strata_refresh::enumerate::FixedEnumerator;
use strata_refresh::error::Error;
use strata_refresh::freshness::{ProbeFailurePolicy, SkipReason};
use strata_refresh::orchestrator::Orchestrator;
use strata_refresh::record::RawRecord;
use strata_refresh::run::{PartitionOutcome, RunOutcome, RunTrigger};
use strata_refresh::source::{MemorySource, Source, SourceErrorKind};
use strata_refresh::store::memory::MemoryStateStore;
use strata_refresh::store::StateStore;
use strata_refresh::transform::IdentityTransform;

struct Fixture {
    source: Arc<MemorySource>,
    store: Arc<MemoryStateStore>,
    engine: Arc<MemoryEngine>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            source: Arc::new(MemorySource::new()),
            store: Arc::new(MemoryStateStore::new()),
            engine: Arc::new(MemoryEngine::new()),
        }
    }

    fn seed(&self, key: &str, rows: usize) {
        let records = (0..rows)
            .map(|i| RawRecord::new(json!({ "key": key, "i": i })))
            .collect();
        self.source.put_partition(key, records);
    }

    fn orchestrator(&self, keys: &[&str], config: RefreshConfig) -> Orchestrator {
        Orchestrator::new(
            Arc::new(FixedEnumerator::new(keys.iter().copied())),
            Arc::clone(&self.store) as Arc<dyn StateStore>,
            Arc::clone(&self.source) as Arc<dyn Source>,
            Arc::clone(&self.engine) as Arc<dyn StorageEngine>,
            Arc::new(IdentityTransform),
            config,
        )
    }

    fn reads(&self, key: &str) -> usize {
        self.source.reads(&PartitionKey::new(key))
    }
}

fn fast_retries(max_attempts: u32) -> RefreshConfig {
    RefreshConfig::default()
        .with_max_attempts(max_attempts)
        .with_retry_backoff(Duration::ZERO, Duration::ZERO)
}

/// Three yearly partitions, one changed upstream: the changed one reloads,
/// the other two cost a probe each and nothing else.
#[tokio::test]
async fn only_changed_partition_is_reloaded() {
    let fx = Fixture::new();
    for key in ["2020", "2021", "2022"] {
        fx.seed(key, 4);
    }
    let orchestrator = fx.orchestrator(&["2020", "2021", "2022"], RefreshConfig::default());

    let first = orchestrator
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap();
    assert_eq!(first.record.partitions_refreshed, 3);

    // Only 2021 changes upstream.
    fx.seed("2021", 6);

    let second = orchestrator
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap();
    assert_eq!(second.record.partitions_considered, 3);
    assert_eq!(second.record.partitions_refreshed, 1);
    assert_eq!(second.record.partitions_failed, 0);
    assert_eq!(second.record.partitions_skipped, 2);

    assert!(matches!(
        second.outcome_of(&PartitionKey::new("2021")),
        Some(PartitionOutcome::Refreshed { rows_written: 6 })
    ));
    assert!(matches!(
        second.outcome_of(&PartitionKey::new("2020")),
        Some(PartitionOutcome::Skipped(SkipReason::Unchanged))
    ));

    // Unchanged partitions were probed, never read.
    assert_eq!(fx.reads("2020"), 1);
    assert_eq!(fx.reads("2022"), 1);
    assert_eq!(fx.reads("2021"), 2);

    let rows = fx
        .engine
        .read_partition(&PartitionKey::new("2021"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 6);
}

/// A new year appearing in an already-committed universe is the only
/// partition loaded: the committed years still match their fingerprints and
/// cost one probe each.
#[tokio::test]
async fn new_year_joining_universe_refreshes_only_itself() {
    let fx = Fixture::new();
    fx.seed("2020", 4);
    fx.seed("2021", 4);

    let initial = fx.orchestrator(&["2020", "2021"], RefreshConfig::default());
    let first = initial
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap();
    assert_eq!(first.record.partitions_refreshed, 2);

    // 2022 starts existing upstream and enumeration picks it up.
    fx.seed("2022", 5);
    let grown = fx.orchestrator(&["2020", "2021", "2022"], RefreshConfig::default());
    let report = grown.run_cycle(RunTrigger::manual(false)).await.unwrap();

    assert_eq!(report.record.partitions_considered, 3);
    assert_eq!(report.record.partitions_refreshed, 1);
    assert_eq!(report.record.partitions_failed, 0);
    assert_eq!(report.record.partitions_skipped, 2);

    assert!(matches!(
        report.outcome_of(&PartitionKey::new("2022")),
        Some(PartitionOutcome::Refreshed { rows_written: 5 })
    ));
    for key in ["2020", "2021"] {
        assert!(matches!(
            report.outcome_of(&PartitionKey::new(key)),
            Some(PartitionOutcome::Skipped(SkipReason::Unchanged))
        ));
        assert_eq!(fx.reads(key), 1);
    }

    let rows = fx
        .engine
        .read_partition(&PartitionKey::new("2022"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 5);
}

/// One partition's load failure never blocks its siblings, and the failed
/// partition's visible content is never blanked.
#[tokio::test]
async fn failure_is_isolated_to_one_partition() {
    let fx = Fixture::new();
    for key in ["2020", "2021", "2022"] {
        fx.seed(key, 3);
    }
    fx.source
        .fail_read_after("2021", 1, SourceErrorKind::Transient);

    let orchestrator = fx.orchestrator(&["2020", "2021", "2022"], fast_retries(3));
    let report = orchestrator
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap();

    assert_eq!(report.record.outcome, RunOutcome::Completed);
    assert_eq!(report.record.partitions_refreshed, 2);
    assert_eq!(report.record.partitions_failed, 1);

    // Siblings committed.
    for key in ["2020", "2022"] {
        let rows = fx
            .engine
            .read_partition(&PartitionKey::new(key))
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
    }
    // The failed partition has no committed content and no leaked staging.
    let rows = fx
        .engine
        .read_partition(&PartitionKey::new("2021"))
        .await
        .unwrap();
    assert!(rows.is_empty());
    assert_eq!(fx.engine.blob_count(), 2);
}

/// A partition that fails `max_attempts` times in a row stops being retried;
/// a larger budget grants exactly one more attempt.
#[tokio::test]
async fn retry_budget_bounds_attempts() {
    for (max_attempts, expected_reads) in [(2_u32, 2_usize), (3, 3)] {
        let fx = Fixture::new();
        fx.seed("2021", 3);
        fx.source
            .fail_read_after("2021", 0, SourceErrorKind::Transient);

        let orchestrator = fx.orchestrator(&["2021"], fast_retries(max_attempts));
        // Run enough cycles to exhaust any budget.
        for _ in 0..5 {
            orchestrator
                .run_cycle(RunTrigger::manual(false))
                .await
                .unwrap();
        }
        assert_eq!(fx.reads("2021"), expected_reads);

        let report = orchestrator
            .run_cycle(RunTrigger::manual(false))
            .await
            .unwrap();
        assert!(matches!(
            report.outcome_of(&PartitionKey::new("2021")),
            Some(PartitionOutcome::Skipped(SkipReason::RetriesExhausted))
        ));
    }
}

/// Permanent failures burn the whole budget on the first attempt.
#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let fx = Fixture::new();
    fx.seed("2021", 3);
    fx.source
        .fail_read_after("2021", 0, SourceErrorKind::Permanent);

    let orchestrator = fx.orchestrator(&["2021"], fast_retries(3));
    let first = orchestrator
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap();
    assert!(matches!(
        first.outcome_of(&PartitionKey::new("2021")),
        Some(PartitionOutcome::Failed {
            will_retry: false,
            ..
        })
    ));

    let second = orchestrator
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap();
    assert!(matches!(
        second.outcome_of(&PartitionKey::new("2021")),
        Some(PartitionOutcome::Skipped(SkipReason::RetriesExhausted))
    ));
    assert_eq!(fx.reads("2021"), 1);
}

/// A forced run bypasses both the staleness check and the exhausted budget.
#[tokio::test]
async fn force_overrides_exhausted_budget() {
    let fx = Fixture::new();
    fx.seed("2021", 3);
    fx.source
        .fail_read_after("2021", 0, SourceErrorKind::Permanent);

    let orchestrator = fx.orchestrator(&["2021"], fast_retries(2));
    orchestrator
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap();

    // Source fixed; only a forced run picks it up again.
    fx.source.restore_read(&PartitionKey::new("2021"));
    let unforced = orchestrator
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap();
    assert_eq!(unforced.record.partitions_refreshed, 0);

    let forced = orchestrator
        .run_cycle(RunTrigger::manual(true))
        .await
        .unwrap();
    assert_eq!(forced.record.partitions_refreshed, 1);
}

/// Probe failure policy decides whether an unprobeable partition reloads or
/// is left alone.
#[tokio::test]
async fn probe_failure_policy_assume_fresh_skips() {
    let fx = Fixture::new();
    fx.seed("2020", 2);

    let config = RefreshConfig::default()
        .with_probe_failure_policy(ProbeFailurePolicy::AssumeFresh)
        .with_retry_backoff(Duration::ZERO, Duration::ZERO);
    let orchestrator = fx.orchestrator(&["2020"], config);
    orchestrator
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap();

    fx.source.fail_probe("2020");
    let report = orchestrator
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap();
    assert!(matches!(
        report.outcome_of(&PartitionKey::new("2020")),
        Some(PartitionOutcome::Skipped(
            SkipReason::ProbeFailedAssumedFresh
        ))
    ));
    assert_eq!(fx.reads("2020"), 1);
}

#[tokio::test]
async fn probe_failure_policy_assume_stale_attempts_reload() {
    let fx = Fixture::new();
    fx.seed("2020", 2);

    let orchestrator = fx.orchestrator(&["2020"], fast_retries(3));
    orchestrator
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap();

    fx.source.fail_probe("2020");
    let report = orchestrator
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap();
    // The reload was attempted; it fails at the pre-read probe and keeps the
    // committed content visible.
    assert!(matches!(
        report.outcome_of(&PartitionKey::new("2020")),
        Some(PartitionOutcome::Failed { .. })
    ));
    let rows = fx
        .engine
        .read_partition(&PartitionKey::new("2020"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
}

/// An unreachable state store aborts the cycle before any partition work.
#[tokio::test]
async fn state_store_outage_aborts_cycle() {
    let fx = Fixture::new();
    fx.seed("2020", 2);

    let orchestrator = fx.orchestrator(&["2020"], RefreshConfig::default());
    fx.store.set_unavailable(true);

    let err = orchestrator
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StateStore { .. }));
    assert_eq!(fx.reads("2020"), 0);

    // Recovery is clean once the store is back.
    fx.store.set_unavailable(false);
    let report = orchestrator
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap();
    assert_eq!(report.record.partitions_refreshed, 1);
}

/// Duplicate keys from enumeration collapse to one load.
#[tokio::test]
async fn duplicate_enumerated_keys_load_once() {
    let fx = Fixture::new();
    fx.seed("2020", 2);

    let orchestrator = fx.orchestrator(&["2020", "2020", "2020"], RefreshConfig::default());
    let report = orchestrator
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap();

    assert_eq!(report.record.partitions_considered, 1);
    assert_eq!(report.record.partitions_refreshed, 1);
    assert_eq!(fx.reads("2020"), 1);
}

/// A partition dropped from enumeration is left untouched, not deleted.
#[tokio::test]
async fn unenumerated_partition_keeps_its_content() {
    let fx = Fixture::new();
    fx.seed("2020", 2);
    fx.seed("2021", 2);

    let both = fx.orchestrator(&["2020", "2021"], RefreshConfig::default());
    both.run_cycle(RunTrigger::manual(false)).await.unwrap();

    let only_2021 = fx.orchestrator(&["2021"], RefreshConfig::default());
    let report = only_2021
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap();
    assert_eq!(report.record.partitions_considered, 1);

    let rows = fx
        .engine
        .read_partition(&PartitionKey::new("2020"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
}

/// Every cycle appends exactly one run record, aborted cycles included.
#[tokio::test]
async fn run_log_grows_one_record_per_cycle() {
    let fx = Fixture::new();
    fx.seed("2020", 1);

    let orchestrator = fx.orchestrator(&["2020"], RefreshConfig::default());
    orchestrator
        .run_cycle(RunTrigger::manual(false))
        .await
        .unwrap();
    orchestrator.run_cycle(RunTrigger::cron()).await.unwrap();

    let runs = fx.store.list_runs().await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.outcome == RunOutcome::Completed));
    assert!(runs.iter().all(|r| r.finished_at.is_some()));
}
