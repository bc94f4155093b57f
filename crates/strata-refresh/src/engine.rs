//! Analytical storage engine collaborator.
//!
//! The engine holds the partitioned target table. Its contract is built
//! around content-addressed blobs and a per-partition pointer: staged
//! content lives at its own identity until a single [`StorageEngine::repoint`]
//! makes it the partition's visible content. A crash before the repoint
//! leaves the old content fully intact; a crash after leaves the new content
//! fully intact. Unreferenced blobs (orphaned staging, unreclaimed retired
//! content) are discoverable via [`StorageEngine::list_staged`] so a later
//! sweep can reclaim them.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use strata_core::{JobId, PartitionKey};

use crate::record::Row;

/// Error raised by engine operations.
#[derive(Debug, Clone, thiserror::Error)]
#[error("engine error: {message}")]
pub struct EngineError {
    /// Description of the failure.
    pub message: String,
}

impl EngineError {
    /// Creates a new engine error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A pointer to staged (or retired) partition content.
///
/// Handles are serializable so they can travel through job bookkeeping and
/// survive in sweep listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingHandle {
    /// The load job that produced this content.
    pub job_id: JobId,
    /// The partition this content was staged for.
    pub key: PartitionKey,
    /// Engine-opaque content identity.
    pub token: String,
}

/// Write-side contract against the analytical storage engine.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Opens a new staging area for one partition, isolated from the
    /// partition's currently-visible content.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the staging area cannot be created.
    async fn begin_staging(&self, key: &PartitionKey) -> Result<StagingHandle, EngineError>;

    /// Appends a batch of transformed rows to a staging area.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the write fails; the staging area is then
    /// unusable and should be deleted.
    async fn write_staging(
        &self,
        handle: &StagingHandle,
        rows: Vec<Row>,
    ) -> Result<(), EngineError>;

    /// Atomically switches the partition's visible content to the staged
    /// content. Returns the handle of the retired (previously visible)
    /// content, if the partition had any.
    ///
    /// Readers observe the swap as instantaneous: old content or new
    /// content, never a mix.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the repoint is rejected; the previously
    /// visible content remains authoritative.
    async fn repoint(
        &self,
        key: &PartitionKey,
        handle: &StagingHandle,
    ) -> Result<Option<StagingHandle>, EngineError>;

    /// Deletes staged or retired content.
    ///
    /// Idempotent: deleting an already-absent handle succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the delete fails; callers treat this as
    /// deferrable (the content is unreferenced either way).
    async fn delete_staging(&self, handle: &StagingHandle) -> Result<(), EngineError>;

    /// Reads the committed (visible) content of one partition.
    ///
    /// Returns an empty vector for a partition that has never been committed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the read fails.
    async fn read_partition(&self, key: &PartitionKey) -> Result<Vec<Row>, EngineError>;

    /// Lists blobs not referenced by any partition pointer: orphaned staging
    /// areas and retired content whose reclamation failed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the listing fails.
    async fn list_staged(&self) -> Result<Vec<StagingHandle>, EngineError>;
}

#[derive(Debug, Clone)]
struct Blob {
    handle: StagingHandle,
    rows: Vec<Row>,
}

/// In-memory storage engine for testing.
///
/// Implements the repoint as a pointer swap under one write lock, so
/// concurrent readers always observe fully-old or fully-new content.
/// Supports fault injection (repoint and delete failures) and an injectable
/// pre-repoint delay for atomicity tests.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    blobs: RwLock<HashMap<String, Blob>>,
    live: RwLock<HashMap<PartitionKey, String>>,
    repoint_delay: Mutex<Option<Duration>>,
    fail_repoint: Mutex<HashSet<PartitionKey>>,
    fail_deletes: AtomicBool,
}

impl MemoryEngine {
    /// Creates a new empty memory engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects a delay between staging write and pointer swap on every
    /// subsequent repoint.
    pub fn set_repoint_delay(&self, delay: Option<Duration>) {
        *self.repoint_delay.lock().expect("engine lock poisoned") = delay;
    }

    /// Injects a repoint failure for one partition.
    pub fn fail_repoint(&self, key: impl Into<PartitionKey>) {
        self.fail_repoint
            .lock()
            .expect("engine lock poisoned")
            .insert(key.into());
    }

    /// Clears an injected repoint failure.
    pub fn restore_repoint(&self, key: &PartitionKey) {
        self.fail_repoint
            .lock()
            .expect("engine lock poisoned")
            .remove(key);
    }

    /// Makes all deletes fail (or succeed again) to exercise deferred
    /// reclamation.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of blobs currently held, referenced or not.
    #[must_use]
    pub fn blob_count(&self) -> usize {
        self.blobs.read().expect("engine lock poisoned").len()
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    async fn begin_staging(&self, key: &PartitionKey) -> Result<StagingHandle, EngineError> {
        let job_id = JobId::generate();
        let handle = StagingHandle {
            job_id,
            key: key.clone(),
            token: format!("staging/{key}/{job_id}"),
        };
        self.blobs.write().expect("engine lock poisoned").insert(
            handle.token.clone(),
            Blob {
                handle: handle.clone(),
                rows: Vec::new(),
            },
        );
        Ok(handle)
    }

    async fn write_staging(
        &self,
        handle: &StagingHandle,
        mut rows: Vec<Row>,
    ) -> Result<(), EngineError> {
        let mut blobs = self.blobs.write().expect("engine lock poisoned");
        let blob = blobs
            .get_mut(&handle.token)
            .ok_or_else(|| EngineError::new(format!("unknown staging area: {}", handle.token)))?;
        blob.rows.append(&mut rows);
        Ok(())
    }

    async fn repoint(
        &self,
        key: &PartitionKey,
        handle: &StagingHandle,
    ) -> Result<Option<StagingHandle>, EngineError> {
        let delay = *self.repoint_delay.lock().expect("engine lock poisoned");
        if let Some(delay) = delay {
            // Simulates a slow metadata operation while readers keep querying
            // the old content.
            tokio::time::sleep(delay).await;
        }

        if self
            .fail_repoint
            .lock()
            .expect("engine lock poisoned")
            .contains(key)
        {
            return Err(EngineError::new(format!(
                "injected repoint failure for {key}"
            )));
        }

        if !self
            .blobs
            .read()
            .expect("engine lock poisoned")
            .contains_key(&handle.token)
        {
            return Err(EngineError::new(format!(
                "staged content missing: {}",
                handle.token
            )));
        }

        // The swap itself: one pointer write under the live-map lock.
        let mut live = self.live.write().expect("engine lock poisoned");
        let retired_token = live.insert(key.clone(), handle.token.clone());
        drop(live);

        let retired = retired_token.and_then(|token| {
            self.blobs
                .read()
                .expect("engine lock poisoned")
                .get(&token)
                .map(|blob| blob.handle.clone())
        });
        Ok(retired)
    }

    async fn delete_staging(&self, handle: &StagingHandle) -> Result<(), EngineError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(EngineError::new(format!(
                "injected delete failure for {}",
                handle.token
            )));
        }
        self.blobs
            .write()
            .expect("engine lock poisoned")
            .remove(&handle.token);
        Ok(())
    }

    async fn read_partition(&self, key: &PartitionKey) -> Result<Vec<Row>, EngineError> {
        // Hold the pointer lock while resolving the blob so a concurrent
        // repoint-plus-reclaim cannot pull the content out from under us.
        let live = self.live.read().expect("engine lock poisoned");
        let Some(token) = live.get(key) else {
            return Ok(Vec::new());
        };
        let blobs = self.blobs.read().expect("engine lock poisoned");
        let rows = blobs
            .get(token)
            .map(|blob| blob.rows.clone())
            .ok_or_else(|| EngineError::new(format!("dangling partition pointer for {key}")))?;
        Ok(rows)
    }

    async fn list_staged(&self) -> Result<Vec<StagingHandle>, EngineError> {
        let referenced: HashSet<String> = self
            .live
            .read()
            .expect("engine lock poisoned")
            .values()
            .cloned()
            .collect();
        let blobs = self.blobs.read().expect("engine lock poisoned");
        Ok(blobs
            .values()
            .filter(|blob| !referenced.contains(&blob.handle.token))
            .map(|blob| blob.handle.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(n: usize) -> Vec<Row> {
        (0..n).map(|i| Row::new(json!({ "i": i }))).collect()
    }

    #[tokio::test]
    async fn staged_content_is_invisible_until_repoint() {
        let engine = MemoryEngine::new();
        let key = PartitionKey::new("2024");

        let handle = engine.begin_staging(&key).await.unwrap();
        engine.write_staging(&handle, rows(3)).await.unwrap();
        assert!(engine.read_partition(&key).await.unwrap().is_empty());

        engine.repoint(&key, &handle).await.unwrap();
        assert_eq!(engine.read_partition(&key).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn repoint_returns_retired_handle() {
        let engine = MemoryEngine::new();
        let key = PartitionKey::new("2024");

        let first = engine.begin_staging(&key).await.unwrap();
        engine.write_staging(&first, rows(2)).await.unwrap();
        assert!(engine.repoint(&key, &first).await.unwrap().is_none());

        let second = engine.begin_staging(&key).await.unwrap();
        engine.write_staging(&second, rows(5)).await.unwrap();
        let retired = engine.repoint(&key, &second).await.unwrap();
        assert_eq!(retired, Some(first));
        assert_eq!(engine.read_partition(&key).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn failed_repoint_leaves_old_content_visible() {
        let engine = MemoryEngine::new();
        let key = PartitionKey::new("2024");

        let first = engine.begin_staging(&key).await.unwrap();
        engine.write_staging(&first, rows(2)).await.unwrap();
        engine.repoint(&key, &first).await.unwrap();

        engine.fail_repoint("2024");
        let second = engine.begin_staging(&key).await.unwrap();
        engine.write_staging(&second, rows(9)).await.unwrap();
        assert!(engine.repoint(&key, &second).await.is_err());
        assert_eq!(engine.read_partition(&key).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn list_staged_excludes_referenced_blobs() {
        let engine = MemoryEngine::new();
        let key = PartitionKey::new("2024");

        let committed = engine.begin_staging(&key).await.unwrap();
        engine.write_staging(&committed, rows(1)).await.unwrap();
        engine.repoint(&key, &committed).await.unwrap();

        let orphan = engine.begin_staging(&key).await.unwrap();
        engine.write_staging(&orphan, rows(1)).await.unwrap();

        let staged = engine.list_staged().await.unwrap();
        assert_eq!(staged, vec![orphan]);
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_faultable() {
        let engine = MemoryEngine::new();
        let key = PartitionKey::new("2024");
        let handle = engine.begin_staging(&key).await.unwrap();

        engine.fail_deletes(true);
        assert!(engine.delete_staging(&handle).await.is_err());

        engine.fail_deletes(false);
        engine.delete_staging(&handle).await.unwrap();
        engine.delete_staging(&handle).await.unwrap();
        assert_eq!(engine.blob_count(), 0);
    }
}
