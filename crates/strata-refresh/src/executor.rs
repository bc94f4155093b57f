//! Streaming partition loads.
//!
//! The executor owns one partition's load attempt: open a record stream
//! from the source, apply the transform (which may fan out or filter), and
//! write the resulting rows into an isolated staging area. The read/transform
//! stage and the staging-write stage run concurrently, connected by a
//! bounded channel, so a partition of any size loads in constant memory.
//!
//! Failed attempts never leave visible side effects: the staging area is
//! discarded on every failure path, and anything a crash leaves behind is
//! reclaimed by the orchestrator's sweep.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;

use strata_core::{Fingerprint, JobId, PartitionKey};

use crate::engine::{EngineError, StagingHandle, StorageEngine};
use crate::error::{Error, Result};
use crate::record::Row;
use crate::source::Source;
use crate::transform::Transform;

/// One completed load attempt, ready to commit.
#[derive(Debug, Clone)]
pub struct LoadJob {
    /// Unique job identifier.
    pub id: JobId,
    /// The partition that was loaded.
    pub key: PartitionKey,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// The staged content awaiting commit.
    pub staging: StagingHandle,
    /// Transformed rows written to staging.
    pub rows_written: u64,
    /// Fingerprint of the source content this attempt read.
    pub fingerprint: Fingerprint,
}

/// Streams one partition from source through transform into staging.
pub struct LoadExecutor {
    source: Arc<dyn Source>,
    engine: Arc<dyn StorageEngine>,
    transform: Arc<dyn Transform>,
    batch_size: usize,
    channel_capacity: usize,
}

impl LoadExecutor {
    /// Creates a new executor.
    #[must_use]
    pub fn new(
        source: Arc<dyn Source>,
        engine: Arc<dyn StorageEngine>,
        transform: Arc<dyn Transform>,
        batch_size: usize,
        channel_capacity: usize,
    ) -> Self {
        Self {
            source,
            engine,
            transform,
            batch_size: batch_size.max(1),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Loads one partition into a fresh staging area.
    ///
    /// `fingerprint` is the probe result from freshness evaluation, when one
    /// was taken; otherwise the executor probes before reading so the
    /// fingerprint recorded at commit matches the content actually loaded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Probe`] if the pre-read probe fails, otherwise
    /// [`Error::Load`] with a retryability classification. On any error the
    /// staging area has already been discarded.
    #[tracing::instrument(skip(self, fingerprint), fields(partition = %key))]
    pub async fn load(
        &self,
        key: &PartitionKey,
        fingerprint: Option<Fingerprint>,
    ) -> Result<LoadJob> {
        let started_at = Utc::now();

        let fingerprint = match fingerprint {
            Some(fp) => fp,
            None => self.source.probe(key).await.map_err(|e| Error::Probe {
                key: key.clone(),
                message: e.to_string(),
            })?,
        };

        let mut stream = self.source.read(key).await.map_err(|e| Error::Load {
            key: key.clone(),
            message: format!("failed to open record stream: {e}"),
            retryable: e.is_transient(),
        })?;

        let staging = self
            .engine
            .begin_staging(key)
            .await
            .map_err(|e| Error::Load {
                key: key.clone(),
                message: format!("failed to open staging area: {e}"),
                retryable: true,
            })?;

        // Writer stage: drains batches into the staging area. The channel
        // bound is what keeps memory constant regardless of partition size.
        let (tx, mut rx) = mpsc::channel::<Vec<Row>>(self.channel_capacity);
        let writer_engine = Arc::clone(&self.engine);
        let writer_handle = staging.clone();
        let writer = tokio::spawn(async move {
            let mut written: u64 = 0;
            while let Some(batch) = rx.recv().await {
                written += batch.len() as u64;
                writer_engine.write_staging(&writer_handle, batch).await?;
            }
            Ok::<u64, EngineError>(written)
        });

        // Read/transform stage.
        let mut batch: Vec<Row> = Vec::with_capacity(self.batch_size);
        let mut failure: Option<Error> = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(raw) => match self.transform.apply(raw) {
                    Ok(rows) => {
                        batch.extend(rows);
                        if batch.len() >= self.batch_size {
                            let full = std::mem::replace(
                                &mut batch,
                                Vec::with_capacity(self.batch_size),
                            );
                            if tx.send(full).await.is_err() {
                                // Writer bailed; its error surfaces below.
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        failure = Some(Error::Load {
                            key: key.clone(),
                            message: e.to_string(),
                            retryable: false,
                        });
                        break;
                    }
                },
                Err(e) => {
                    failure = Some(Error::Load {
                        key: key.clone(),
                        message: e.to_string(),
                        retryable: e.is_transient(),
                    });
                    break;
                }
            }
        }
        if failure.is_none() && !batch.is_empty() {
            let _ = tx.send(batch).await;
        }
        drop(tx);

        let writer_result = match writer.await {
            Ok(result) => result,
            Err(e) => {
                self.discard(&staging).await;
                return Err(Error::Load {
                    key: key.clone(),
                    message: format!("staging writer panicked: {e}"),
                    retryable: true,
                });
            }
        };

        if let Some(error) = failure {
            self.discard(&staging).await;
            return Err(error);
        }

        let rows_written = match writer_result {
            Ok(written) => written,
            Err(e) => {
                self.discard(&staging).await;
                return Err(Error::Load {
                    key: key.clone(),
                    message: format!("staging write failed: {e}"),
                    retryable: true,
                });
            }
        };

        tracing::debug!(partition = %key, rows = rows_written, "partition staged");
        Ok(LoadJob {
            id: staging.job_id,
            key: key.clone(),
            started_at,
            staging,
            rows_written,
            fingerprint,
        })
    }

    async fn discard(&self, staging: &StagingHandle) {
        if let Err(e) = self.engine.delete_staging(staging).await {
            // The sweep reclaims it later; the attempt is already failed.
            tracing::warn!(token = %staging.token, error = %e, "failed to discard staging area");
        }
    }
}
