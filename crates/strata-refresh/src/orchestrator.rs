//! The refresh orchestrator: one cycle state machine over all partitions.
//!
//! A cycle walks Enumerating -> Evaluating -> Refreshing -> Reconciling and
//! produces exactly one [`RunRecord`] whether it completes or aborts. The
//! orchestrator owns the only write path to partition state; workers claim
//! keys through the state store's compare-and-swap so two jobs never load
//! the same partition concurrently.
//!
//! Triggers (cron ticks, manual requests) arrive on a channel. At most one
//! cycle runs at a time; triggers landing mid-cycle coalesce into a single
//! pending re-run via [`RunTrigger::coalesce`].

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use strata_core::{Fingerprint, PartitionKey};

use crate::config::RefreshConfig;
use crate::engine::StorageEngine;
use crate::enumerate::{dedupe_keys, PartitionEnumerator};
use crate::error::{Error, Result};
use crate::executor::LoadExecutor;
use crate::freshness::{FreshnessEvaluator, SkipReason, Staleness};
use crate::metrics::RefreshMetrics;
use crate::replacer::AtomicReplacer;
use crate::run::{CycleReport, PartitionOutcome, RunOutcome, RunRecord, RunTrigger};
use crate::source::Source;
use crate::state::{PartitionState, PartitionStatus};
use crate::store::{ClaimOutcome, StateStore};
use crate::transform::Transform;

/// Messages accepted by the orchestrator event loop.
#[derive(Debug)]
pub(crate) enum TriggerMessage {
    /// Run a cycle.
    Run(RunTrigger),
    /// Stop after the current cycle (if any) finishes.
    Shutdown,
}

/// Cheap-to-clone handle for sending triggers to a running orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<TriggerMessage>,
}

impl OrchestratorHandle {
    pub(crate) fn from_sender(tx: mpsc::Sender<TriggerMessage>) -> Self {
        Self { tx }
    }

    /// Sends a trigger to the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] if the orchestrator has stopped.
    pub async fn trigger(&self, trigger: RunTrigger) -> Result<()> {
        self.tx
            .send(TriggerMessage::Run(trigger))
            .await
            .map_err(|_| Error::Shutdown)
    }

    /// Requests a manual cycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] if the orchestrator has stopped.
    pub async fn run_now(&self, force: bool) -> Result<()> {
        self.trigger(RunTrigger::manual(force)).await
    }

    /// Asks the orchestrator to stop. In-flight work finishes first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] if the orchestrator has already stopped.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(TriggerMessage::Shutdown)
            .await
            .map_err(|_| Error::Shutdown)
    }
}

/// Drives refresh cycles over the full partition universe.
pub struct Orchestrator {
    enumerator: Arc<dyn PartitionEnumerator>,
    store: Arc<dyn StateStore>,
    source: Arc<dyn Source>,
    engine: Arc<dyn StorageEngine>,
    executor: Arc<LoadExecutor>,
    replacer: Arc<AtomicReplacer>,
    evaluator: FreshnessEvaluator,
    config: RefreshConfig,
    metrics: RefreshMetrics,
    tx: mpsc::Sender<TriggerMessage>,
    rx: mpsc::Receiver<TriggerMessage>,
}

impl Orchestrator {
    /// Creates an orchestrator over the given collaborators.
    #[must_use]
    pub fn new(
        enumerator: Arc<dyn PartitionEnumerator>,
        store: Arc<dyn StateStore>,
        source: Arc<dyn Source>,
        engine: Arc<dyn StorageEngine>,
        transform: Arc<dyn Transform>,
        config: RefreshConfig,
    ) -> Self {
        let executor = Arc::new(LoadExecutor::new(
            Arc::clone(&source),
            Arc::clone(&engine),
            transform,
            config.batch_size,
            config.channel_capacity,
        ));
        let replacer = Arc::new(AtomicReplacer::new(Arc::clone(&engine)));
        let evaluator = FreshnessEvaluator::new(config.probe_failure_policy, config.max_attempts);
        let (tx, rx) = mpsc::channel(16);
        Self {
            enumerator,
            store,
            source,
            engine,
            executor,
            replacer,
            evaluator,
            config,
            metrics: RefreshMetrics::new(),
            tx,
            rx,
        }
    }

    /// Returns a handle for sending triggers to this orchestrator.
    #[must_use]
    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle::from_sender(self.tx.clone())
    }

    /// Runs the event loop until shutdown is requested or every handle is
    /// dropped.
    ///
    /// Cycles run strictly one at a time. Triggers arriving while a cycle is
    /// in flight are drained afterwards and coalesced into a single pending
    /// re-run.
    pub async fn run(mut self) {
        tracing::info!("orchestrator event loop started");
        loop {
            let Some(message) = self.rx.recv().await else {
                break;
            };
            let mut pending = match message {
                TriggerMessage::Shutdown => break,
                TriggerMessage::Run(trigger) => Some(trigger),
            };

            while let Some(trigger) = pending.take() {
                if let Err(e) = self.run_cycle(trigger).await {
                    tracing::error!(error = %e, "cycle failed to record its outcome");
                }

                let mut shutdown = false;
                while let Ok(message) = self.rx.try_recv() {
                    match message {
                        TriggerMessage::Shutdown => {
                            shutdown = true;
                            break;
                        }
                        TriggerMessage::Run(trigger) => match pending.as_mut() {
                            Some(p) => p.coalesce(trigger),
                            None => pending = Some(trigger),
                        },
                    }
                }
                if shutdown {
                    tracing::info!("orchestrator shutting down");
                    return;
                }
            }
        }
        tracing::info!("orchestrator shutting down");
    }

    /// Runs one full refresh cycle and appends its [`RunRecord`] to the run
    /// log.
    ///
    /// Cycle-level failures (enumeration, state store) abort the cycle: the
    /// record is marked aborted and no partition is touched beyond what
    /// already completed.
    ///
    /// # Errors
    ///
    /// Returns an error only when the run record itself cannot be appended;
    /// everything else is captured in the returned [`CycleReport`].
    #[tracing::instrument(skip(self, trigger), fields(source = %trigger.source, force = trigger.force))]
    pub async fn run_cycle(&self, trigger: RunTrigger) -> Result<CycleReport> {
        let started = Instant::now();
        let mut record = RunRecord::begin(trigger);
        tracing::info!(run_id = %record.id, "cycle started");

        let partitions = match self.execute_cycle(&mut record, trigger).await {
            Ok(partitions) => {
                record.finish();
                partitions
            }
            Err(e) => {
                tracing::error!(run_id = %record.id, error = %e, "cycle aborted");
                record.abort(e.to_string());
                Vec::new()
            }
        };

        let outcome = match record.outcome {
            RunOutcome::Completed => "completed",
            RunOutcome::Aborted => "aborted",
        };
        self.metrics
            .record_cycle(&record.trigger_source.to_string(), outcome, started.elapsed());
        tracing::info!(
            run_id = %record.id,
            outcome,
            considered = record.partitions_considered,
            refreshed = record.partitions_refreshed,
            failed = record.partitions_failed,
            skipped = record.partitions_skipped,
            "cycle finished"
        );

        self.store.append_run(&record).await?;
        Ok(CycleReport { record, partitions })
    }

    /// The cycle body proper. Any error returned here aborts the cycle.
    async fn execute_cycle(
        &self,
        record: &mut RunRecord,
        trigger: RunTrigger,
    ) -> Result<Vec<(PartitionKey, PartitionOutcome)>> {
        self.recover_interrupted().await?;

        // Enumerating.
        let keys = dedupe_keys(self.enumerator.enumerate().await?);
        record.partitions_considered = keys.len();
        tracing::info!(partitions = keys.len(), "enumerated partition universe");

        // Evaluating.
        let now = Utc::now();
        let mut outcomes: Vec<(PartitionKey, PartitionOutcome)> = Vec::with_capacity(keys.len());
        let mut refresh_set: Vec<(PartitionKey, Option<Fingerprint>)> = Vec::new();
        for key in &keys {
            let state = self.store.get(key).await?;
            let verdict = self
                .evaluator
                .evaluate(self.source.as_ref(), key, state.as_ref(), trigger.force, now)
                .await;
            match verdict {
                Staleness::Refresh {
                    reason,
                    fingerprint,
                } => {
                    tracing::debug!(partition = %key, %reason, "partition needs refresh");
                    refresh_set.push((key.clone(), fingerprint));
                }
                Staleness::Skip(reason) => {
                    tracing::debug!(partition = %key, %reason, "partition skipped");
                    outcomes.push((key.clone(), PartitionOutcome::Skipped(reason)));
                }
            }
        }

        // Refreshing.
        self.metrics.set_active_jobs(refresh_set.len());
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut workers: JoinSet<(PartitionKey, PartitionOutcome)> = JoinSet::new();
        for (key, fingerprint) in refresh_set {
            match self.store.claim(&key).await? {
                ClaimOutcome::InFlight => {
                    tracing::warn!(partition = %key, "partition already claimed by another job");
                    outcomes.push((key, PartitionOutcome::Skipped(SkipReason::InFlight)));
                }
                ClaimOutcome::Claimed(state) => {
                    let executor = Arc::clone(&self.executor);
                    let replacer = Arc::clone(&self.replacer);
                    let store = Arc::clone(&self.store);
                    let config = self.config.clone();
                    let metrics = self.metrics.clone();
                    let semaphore = Arc::clone(&semaphore);
                    workers.spawn(async move {
                        let _permit = semaphore.acquire_owned().await.ok();
                        let key = state.key.clone();
                        let outcome = refresh_partition(
                            executor, replacer, store, config, metrics, state, fingerprint,
                        )
                        .await;
                        (key, outcome)
                    });
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((key, outcome)) => outcomes.push((key, outcome)),
                Err(e) => tracing::error!(error = %e, "refresh worker panicked"),
            }
        }
        self.metrics.set_active_jobs(0);

        // Reconciling.
        self.sweep_orphans().await;

        outcomes.sort_by_key(|(key, _)| keys.iter().position(|k| k == key));
        for (_, outcome) in &outcomes {
            let result = match outcome {
                PartitionOutcome::Refreshed { .. } => "refreshed",
                PartitionOutcome::Skipped(_) => "skipped",
                PartitionOutcome::Failed { .. } => "failed",
            };
            self.metrics.record_partition(result);
            match outcome {
                PartitionOutcome::Refreshed { .. } => record.partitions_refreshed += 1,
                PartitionOutcome::Skipped(_) => record.partitions_skipped += 1,
                PartitionOutcome::Failed { .. } => record.partitions_failed += 1,
            }
        }
        Ok(outcomes)
    }

    /// Resets partitions stuck in `Loading` from an interrupted process.
    ///
    /// Their staging writes never reached a repoint, so the previously
    /// committed content is still authoritative; the partition just owes a
    /// new attempt.
    async fn recover_interrupted(&self) -> Result<()> {
        for mut state in self.store.list().await? {
            if state.status == PartitionStatus::Loading {
                tracing::warn!(
                    partition = %state.key,
                    "recovering partition left mid-load by a previous process"
                );
                state.record_failure("load interrupted by restart", Some(Utc::now()))?;
                self.store.put(&state).await?;
            }
        }
        Ok(())
    }

    /// Deletes blobs no partition pointer references: orphaned staging areas
    /// from crashed loads and retired content whose reclamation failed.
    ///
    /// Failures here are deferred, never fatal; the next cycle sweeps again.
    async fn sweep_orphans(&self) {
        let orphans = match self.engine.list_staged().await {
            Ok(orphans) => orphans,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list unreferenced content");
                return;
            }
        };
        for handle in orphans {
            match self.engine.delete_staging(&handle).await {
                Ok(()) => {
                    tracing::info!(partition = %handle.key, token = %handle.token, "reclaimed unreferenced content");
                }
                Err(e) => {
                    self.metrics.record_reclamation_failure();
                    tracing::warn!(
                        partition = %handle.key,
                        token = %handle.token,
                        error = %e,
                        "failed to reclaim unreferenced content"
                    );
                }
            }
        }
    }
}

/// Loads, commits, and persists final state for one claimed partition.
///
/// The claim is released by the final `put`: both arms write a terminal
/// status (`Committed` or `Failed`), making the key claimable again.
async fn refresh_partition(
    executor: Arc<LoadExecutor>,
    replacer: Arc<AtomicReplacer>,
    store: Arc<dyn StateStore>,
    config: RefreshConfig,
    metrics: RefreshMetrics,
    mut state: PartitionState,
    fingerprint: Option<Fingerprint>,
) -> PartitionOutcome {
    let key = state.key.clone();
    let started = Instant::now();

    let result = match executor.load(&key, fingerprint).await {
        Ok(job) => replacer.commit(&job).await.map(|commit| (job, commit)),
        Err(e) => Err(e),
    };

    match result {
        Ok((job, commit)) => {
            if !commit.reclaimed {
                metrics.record_reclamation_failure();
            }
            metrics.add_rows_staged(job.rows_written);
            metrics.observe_load_duration("refreshed", started.elapsed());

            if let Err(e) = state.record_commit(job.fingerprint.clone(), Utc::now()) {
                tracing::error!(partition = %key, error = %e, "commit state transition rejected");
            }
            if let Err(e) = store.put(&state).await {
                // The repoint happened, so readers already see the new
                // content; the stale watermark means at worst one redundant
                // reload next cycle.
                tracing::error!(partition = %key, error = %e, "failed to persist committed state");
                return PartitionOutcome::Failed {
                    error: e.to_string(),
                    will_retry: true,
                };
            }
            tracing::info!(partition = %key, rows = job.rows_written, "partition refreshed");
            PartitionOutcome::Refreshed {
                rows_written: job.rows_written,
            }
        }
        Err(e) => {
            metrics.observe_load_duration("failed", started.elapsed());

            let retryable = e.is_retryable();
            let attempts_after = state.attempt_count.saturating_add(1);
            let will_retry = retryable && attempts_after < config.max_attempts;
            let next_retry_at = will_retry.then(|| {
                let backoff = config.backoff_for(attempts_after);
                Utc::now()
                    + chrono::Duration::from_std(backoff)
                        .unwrap_or_else(|_| chrono::Duration::zero())
            });

            if let Err(se) = state.record_failure(e.to_string(), next_retry_at) {
                tracing::error!(partition = %key, error = %se, "failure state transition rejected");
            }
            if !retryable {
                // Permanent failures exhaust the budget immediately; only a
                // forced refresh or a source fix gets the partition moving.
                state.attempt_count = state.attempt_count.max(config.max_attempts);
            }
            if let Err(se) = store.put(&state).await {
                tracing::error!(partition = %key, error = %se, "failed to persist failed state");
            }
            tracing::warn!(partition = %key, error = %e, will_retry, "partition refresh failed");
            PartitionOutcome::Failed {
                error: e.to_string(),
                will_retry,
            }
        }
    }
}
