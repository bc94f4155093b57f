//! Durable JSON-file state store.
//!
//! Persists the full snapshot (partition states plus run log) as one JSON
//! document, written with the same temp-then-rename discipline the engine
//! uses for partition content: a crash mid-write leaves the previous
//! snapshot intact. Suited to single-orchestrator deployments, which is the
//! scheduling model here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use strata_core::PartitionKey;

use crate::error::{Error, Result};
use crate::run::RunRecord;
use crate::state::{PartitionState, PartitionStatus};
use crate::store::{ClaimOutcome, StateStore};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    partitions: BTreeMap<PartitionKey, PartitionState>,
    runs: Vec<RunRecord>,
}

/// File-backed state store surviving process restarts.
#[derive(Debug)]
pub struct JsonFileStateStore {
    path: PathBuf,
    snapshot: RwLock<Snapshot>,
}

impl JsonFileStateStore {
    /// Opens a store at the given path, loading any existing snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StateStore`] if an existing snapshot cannot be read
    /// or parsed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::state_store_with_source(
                    format!("corrupt state snapshot at {}", path.display()),
                    e,
                )
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => {
                return Err(Error::state_store_with_source(
                    format!("failed to read state snapshot at {}", path.display()),
                    e,
                ))
            }
        };
        Ok(Self {
            path,
            snapshot: RwLock::new(snapshot),
        })
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|e| Error::Serialization {
            message: format!("failed to encode state snapshot: {e}"),
        })?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await.map_err(|e| {
            Error::state_store_with_source(
                format!("failed to write state snapshot at {}", tmp.display()),
                e,
            )
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            Error::state_store_with_source(
                format!("failed to replace state snapshot at {}", self.path.display()),
                e,
            )
        })
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn get(&self, key: &PartitionKey) -> Result<Option<PartitionState>> {
        Ok(self.snapshot.read().await.partitions.get(key).cloned())
    }

    async fn put(&self, state: &PartitionState) -> Result<()> {
        let mut snapshot = self.snapshot.write().await;
        snapshot
            .partitions
            .insert(state.key.clone(), state.clone());
        self.persist(&snapshot).await
    }

    async fn list(&self) -> Result<Vec<PartitionState>> {
        Ok(self
            .snapshot
            .read()
            .await
            .partitions
            .values()
            .cloned()
            .collect())
    }

    async fn remove(&self, key: &PartitionKey) -> Result<()> {
        let mut snapshot = self.snapshot.write().await;
        snapshot.partitions.remove(key);
        self.persist(&snapshot).await
    }

    async fn claim(&self, key: &PartitionKey) -> Result<ClaimOutcome> {
        let mut snapshot = self.snapshot.write().await;
        let state = snapshot
            .partitions
            .entry(key.clone())
            .or_insert_with(|| PartitionState::new(key.clone()));

        if !state.status.is_claimable() {
            return Ok(ClaimOutcome::InFlight);
        }
        state.transition_to(PartitionStatus::Loading)?;
        let claimed = state.clone();
        self.persist(&snapshot).await?;
        Ok(ClaimOutcome::Claimed(claimed))
    }

    async fn append_run(&self, record: &RunRecord) -> Result<()> {
        let mut snapshot = self.snapshot.write().await;
        snapshot.runs.push(record.clone());
        self.persist(&snapshot).await
    }

    async fn list_runs(&self) -> Result<Vec<RunRecord>> {
        Ok(self.snapshot.read().await.runs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunTrigger;
    use strata_core::Fingerprint;

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let key = PartitionKey::new("2024");

        {
            let store = JsonFileStateStore::open(&path).await.unwrap();
            let ClaimOutcome::Claimed(mut state) = store.claim(&key).await.unwrap() else {
                panic!("expected claim to succeed");
            };
            state
                .record_commit(Fingerprint::from_bytes(b"v1"), chrono::Utc::now())
                .unwrap();
            store.put(&state).await.unwrap();
            store
                .append_run(&RunRecord::begin(RunTrigger::manual(false)))
                .await
                .unwrap();
        }

        let reopened = JsonFileStateStore::open(&path).await.unwrap();
        let state = reopened.get(&key).await.unwrap().unwrap();
        assert_eq!(state.status, PartitionStatus::Committed);
        assert!(state.source_fingerprint.is_some());
        assert_eq!(reopened.list_runs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::open(dir.path().join("fresh.json"))
            .await
            .unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.list_runs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let result = JsonFileStateStore::open(&path).await;
        assert!(matches!(result, Err(Error::StateStore { .. })));
    }

    #[tokio::test]
    async fn interrupted_claim_survives_reopen_as_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let key = PartitionKey::new("2024");

        {
            let store = JsonFileStateStore::open(&path).await.unwrap();
            store.claim(&key).await.unwrap();
            // Process "crashes" here: claim persisted, no final state written.
        }

        let reopened = JsonFileStateStore::open(&path).await.unwrap();
        let state = reopened.get(&key).await.unwrap().unwrap();
        assert_eq!(state.status, PartitionStatus::Loading);
    }
}
