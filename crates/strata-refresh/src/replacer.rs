//! Atomic partition replacement.
//!
//! The replacer commits a staged load as the partition's new authoritative
//! content. The swap is a single engine-level repoint: a crash before it
//! leaves the old content fully intact, a crash after leaves the new content
//! fully intact. Retired content is reclaimed after the repoint; a failed
//! reclamation is logged and left to the orchestrator's sweep, never
//! affecting correctness.

use std::sync::Arc;

use crate::engine::{StagingHandle, StorageEngine};
use crate::error::{Error, Result};
use crate::executor::LoadJob;

/// Result of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// The content handle retired by the repoint, if the partition had
    /// previously visible content.
    pub retired: Option<StagingHandle>,
    /// Whether the retired content was reclaimed immediately. When false,
    /// the sweep picks it up on a later cycle.
    pub reclaimed: bool,
}

/// Commits staged partition content with single-step visibility.
pub struct AtomicReplacer {
    engine: Arc<dyn StorageEngine>,
}

impl AtomicReplacer {
    /// Creates a new replacer.
    #[must_use]
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self { engine }
    }

    /// Commits one staged load job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Commit`] if the repoint is rejected. The staged
    /// content is discarded and the previously visible content remains
    /// authoritative.
    #[tracing::instrument(skip(self, job), fields(partition = %job.key, job_id = %job.id))]
    pub async fn commit(&self, job: &LoadJob) -> Result<CommitOutcome> {
        let retired = match self.engine.repoint(&job.key, &job.staging).await {
            Ok(retired) => retired,
            Err(e) => {
                if let Err(delete_err) = self.engine.delete_staging(&job.staging).await {
                    tracing::warn!(
                        token = %job.staging.token,
                        error = %delete_err,
                        "failed to discard staging after rejected commit"
                    );
                }
                return Err(Error::Commit {
                    key: job.key.clone(),
                    message: e.to_string(),
                });
            }
        };

        let mut reclaimed = true;
        if let Some(retired) = &retired {
            if let Err(e) = self.engine.delete_staging(retired).await {
                // The repoint already happened; the retired content is
                // unreferenced and a later sweep reclaims it.
                tracing::warn!(
                    partition = %job.key,
                    token = %retired.token,
                    error = %e,
                    "failed to reclaim retired partition content"
                );
                reclaimed = false;
            }
        }

        tracing::info!(
            partition = %job.key,
            rows = job.rows_written,
            "partition content replaced"
        );
        Ok(CommitOutcome { retired, reclaimed })
    }
}
