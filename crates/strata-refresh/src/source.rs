//! Object-store source collaborator.
//!
//! The source owns two operations with very different costs: a cheap
//! metadata [`Source::probe`] used to decide staleness without transferring
//! partition data, and a streaming [`Source::read`] that yields the raw
//! records of one partition. Errors carry a transient/permanent class so the
//! executor can decide retryability.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use strata_core::{Fingerprint, PartitionKey};

use crate::record::RawRecord;

/// Classification of a source failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Network flake, timeout, throttling: a retry may succeed.
    Transient,
    /// Malformed or unsupported data: retrying will not help.
    Permanent,
}

/// Error raised by source operations.
#[derive(Debug, Clone, thiserror::Error)]
#[error("source error ({kind:?}): {message}")]
pub struct SourceError {
    /// Whether the failure looks transient or permanent.
    pub kind: SourceErrorKind,
    /// Description of the failure.
    pub message: String,
}

impl SourceError {
    /// Creates a transient source error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Creates a permanent source error.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// Returns true if a retry may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind, SourceErrorKind::Transient)
    }
}

/// A stream of raw records for one partition.
pub type RecordStream = BoxStream<'static, Result<RawRecord, SourceError>>;

/// Read-side contract against the remote object store.
#[async_trait]
pub trait Source: Send + Sync {
    /// Probes the source for a partition's content fingerprint.
    ///
    /// Must be a metadata-only call (etag/size/mtime): staleness decisions
    /// never transfer partition data.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the probe cannot be completed.
    async fn probe(&self, key: &PartitionKey) -> Result<Fingerprint, SourceError>;

    /// Opens a record stream for one partition.
    ///
    /// The stream may fail mid-flight; consumers must treat a stream error
    /// as aborting the attempt.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the stream cannot be opened.
    async fn read(&self, key: &PartitionKey) -> Result<RecordStream, SourceError>;

    /// Lists the partition keys currently present at the source.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the listing cannot be completed.
    async fn list_keys(&self) -> Result<Vec<PartitionKey>, SourceError>;
}

#[derive(Debug, Clone)]
struct PartitionData {
    records: Vec<RawRecord>,
    version: u64,
}

#[derive(Debug, Clone, Copy)]
struct ReadFault {
    after_records: usize,
    kind: SourceErrorKind,
}

/// In-memory source for testing.
///
/// Thread-safe via `Mutex`. Supports fault injection per partition:
/// probe failures and mid-stream read failures after a configurable number
/// of records. Probe and read invocations are counted so tests can assert
/// the "skip unchanged partitions cheaply" property.
#[derive(Debug, Default)]
pub struct MemorySource {
    partitions: Mutex<BTreeMap<PartitionKey, PartitionData>>,
    probe_faults: Mutex<HashSet<PartitionKey>>,
    read_faults: Mutex<HashMap<PartitionKey, ReadFault>>,
    probe_counts: Mutex<HashMap<PartitionKey, usize>>,
    read_counts: Mutex<HashMap<PartitionKey, usize>>,
    list_fault: Mutex<bool>,
}

impl MemorySource {
    /// Creates a new empty memory source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a partition's records, bumping its version.
    ///
    /// A bumped version changes the partition's fingerprint, so the next
    /// probe reports it as changed.
    pub fn put_partition(&self, key: impl Into<PartitionKey>, records: Vec<RawRecord>) {
        let key = key.into();
        let mut partitions = self.partitions.lock().expect("source lock poisoned");
        let version = partitions.get(&key).map_or(1, |p| p.version + 1);
        partitions.insert(key, PartitionData { records, version });
    }

    /// Injects a probe failure for one partition.
    pub fn fail_probe(&self, key: impl Into<PartitionKey>) {
        self.probe_faults
            .lock()
            .expect("source lock poisoned")
            .insert(key.into());
    }

    /// Clears an injected probe failure.
    pub fn restore_probe(&self, key: &PartitionKey) {
        self.probe_faults
            .lock()
            .expect("source lock poisoned")
            .remove(key);
    }

    /// Injects a read failure after `after_records` records have streamed.
    pub fn fail_read_after(
        &self,
        key: impl Into<PartitionKey>,
        after_records: usize,
        kind: SourceErrorKind,
    ) {
        self.read_faults.lock().expect("source lock poisoned").insert(
            key.into(),
            ReadFault {
                after_records,
                kind,
            },
        );
    }

    /// Clears an injected read failure.
    pub fn restore_read(&self, key: &PartitionKey) {
        self.read_faults
            .lock()
            .expect("source lock poisoned")
            .remove(key);
    }

    /// Injects a failure for `list_keys`.
    pub fn fail_listing(&self, fail: bool) {
        *self.list_fault.lock().expect("source lock poisoned") = fail;
    }

    /// Returns how many times a partition has been probed.
    #[must_use]
    pub fn probes(&self, key: &PartitionKey) -> usize {
        self.probe_counts
            .lock()
            .expect("source lock poisoned")
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Returns how many times a partition's record stream has been opened.
    #[must_use]
    pub fn reads(&self, key: &PartitionKey) -> usize {
        self.read_counts
            .lock()
            .expect("source lock poisoned")
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    fn fingerprint_of(key: &PartitionKey, data: &PartitionData) -> Fingerprint {
        Fingerprint::from_bytes(
            format!("{key}:{}:{}", data.version, data.records.len()).as_bytes(),
        )
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn probe(&self, key: &PartitionKey) -> Result<Fingerprint, SourceError> {
        *self
            .probe_counts
            .lock()
            .expect("source lock poisoned")
            .entry(key.clone())
            .or_insert(0) += 1;

        if self
            .probe_faults
            .lock()
            .expect("source lock poisoned")
            .contains(key)
        {
            return Err(SourceError::transient(format!(
                "injected probe failure for {key}"
            )));
        }

        let partitions = self.partitions.lock().expect("source lock poisoned");
        partitions
            .get(key)
            .map(|data| Self::fingerprint_of(key, data))
            .ok_or_else(|| SourceError::permanent(format!("no such partition: {key}")))
    }

    async fn read(&self, key: &PartitionKey) -> Result<RecordStream, SourceError> {
        *self
            .read_counts
            .lock()
            .expect("source lock poisoned")
            .entry(key.clone())
            .or_insert(0) += 1;

        let records = {
            let partitions = self.partitions.lock().expect("source lock poisoned");
            partitions
                .get(key)
                .map(|data| data.records.clone())
                .ok_or_else(|| SourceError::permanent(format!("no such partition: {key}")))?
        };

        let fault = self
            .read_faults
            .lock()
            .expect("source lock poisoned")
            .get(key)
            .copied();

        let mut items: Vec<Result<RawRecord, SourceError>> = Vec::new();
        match fault {
            Some(fault) => {
                let n = fault.after_records.min(records.len());
                items.extend(records.into_iter().take(n).map(Ok));
                items.push(Err(SourceError {
                    kind: fault.kind,
                    message: format!("injected read failure for {key}"),
                }));
            }
            None => items.extend(records.into_iter().map(Ok)),
        }

        Ok(futures::stream::iter(items).boxed())
    }

    async fn list_keys(&self) -> Result<Vec<PartitionKey>, SourceError> {
        if *self.list_fault.lock().expect("source lock poisoned") {
            return Err(SourceError::transient("injected listing failure"));
        }
        let partitions = self.partitions.lock().expect("source lock poisoned");
        Ok(partitions.keys().cloned().collect())
    }
}
