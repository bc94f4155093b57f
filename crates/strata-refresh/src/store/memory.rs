//! In-memory state store for testing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use strata_core::PartitionKey;

use crate::error::{Error, Result};
use crate::run::RunRecord;
use crate::state::{PartitionState, PartitionStatus};
use crate::store::{ClaimOutcome, StateStore};

/// In-memory state store.
///
/// Not durable; intended for tests and local experiments. Supports fault
/// injection so cycle-abort behavior on store failure can be exercised.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    partitions: RwLock<BTreeMap<PartitionKey, PartitionState>>,
    runs: RwLock<Vec<RunRecord>>,
    unavailable: AtomicBool,
}

impl MemoryStateStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::state_store("injected store outage"));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &PartitionKey) -> Result<Option<PartitionState>> {
        self.check_available()?;
        Ok(self.partitions.read().await.get(key).cloned())
    }

    async fn put(&self, state: &PartitionState) -> Result<()> {
        self.check_available()?;
        self.partitions
            .write()
            .await
            .insert(state.key.clone(), state.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PartitionState>> {
        self.check_available()?;
        Ok(self.partitions.read().await.values().cloned().collect())
    }

    async fn remove(&self, key: &PartitionKey) -> Result<()> {
        self.check_available()?;
        self.partitions.write().await.remove(key);
        Ok(())
    }

    async fn claim(&self, key: &PartitionKey) -> Result<ClaimOutcome> {
        self.check_available()?;
        let mut partitions = self.partitions.write().await;
        let state = partitions
            .entry(key.clone())
            .or_insert_with(|| PartitionState::new(key.clone()));

        if !state.status.is_claimable() {
            return Ok(ClaimOutcome::InFlight);
        }
        state.transition_to(PartitionStatus::Loading)?;
        Ok(ClaimOutcome::Claimed(state.clone()))
    }

    async fn append_run(&self, record: &RunRecord) -> Result<()> {
        self.check_available()?;
        self.runs.write().await.push(record.clone());
        Ok(())
    }

    async fn list_runs(&self) -> Result<Vec<RunRecord>> {
        self.check_available()?;
        Ok(self.runs.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunTrigger;
    use strata_core::Fingerprint;

    #[tokio::test]
    async fn claim_is_exclusive_until_released() {
        let store = MemoryStateStore::new();
        let key = PartitionKey::new("2024");

        let first = store.claim(&key).await.unwrap();
        assert!(first.is_claimed());

        // Second claim while loading is rejected.
        let second = store.claim(&key).await.unwrap();
        assert_eq!(second, ClaimOutcome::InFlight);

        // Releasing via a final-state put makes the key claimable again.
        let ClaimOutcome::Claimed(mut state) = first else {
            unreachable!()
        };
        state
            .record_commit(Fingerprint::from_bytes(b"v1"), chrono::Utc::now())
            .unwrap();
        store.put(&state).await.unwrap();

        assert!(store.claim(&key).await.unwrap().is_claimed());
    }

    #[tokio::test]
    async fn claim_creates_state_on_first_sighting() {
        let store = MemoryStateStore::new();
        let key = PartitionKey::new("2030");
        assert!(store.get(&key).await.unwrap().is_none());

        store.claim(&key).await.unwrap();
        let state = store.get(&key).await.unwrap().unwrap();
        assert_eq!(state.status, PartitionStatus::Loading);
        assert_eq!(state.attempt_count, 0);
    }

    #[tokio::test]
    async fn run_log_is_append_only() {
        let store = MemoryStateStore::new();
        store
            .append_run(&RunRecord::begin(RunTrigger::cron()))
            .await
            .unwrap();
        store
            .append_run(&RunRecord::begin(RunTrigger::manual(false)))
            .await
            .unwrap();

        let runs = store.list_runs().await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].started_at <= runs[1].started_at);
    }

    #[tokio::test]
    async fn outage_fails_every_operation() {
        let store = MemoryStateStore::new();
        store.set_unavailable(true);

        let key = PartitionKey::new("2024");
        assert!(store.get(&key).await.is_err());
        assert!(store.claim(&key).await.is_err());
        assert!(store.list().await.is_err());

        store.set_unavailable(false);
        assert!(store.get(&key).await.is_ok());
    }

    #[tokio::test]
    async fn remove_forgets_partition() {
        let store = MemoryStateStore::new();
        let key = PartitionKey::new("2019");
        store.claim(&key).await.unwrap();
        store.remove(&key).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
    }
}
