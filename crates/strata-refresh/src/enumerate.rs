//! Partition enumeration.
//!
//! The enumerator evaluates the partition-key source into the current
//! universe of keys. It is re-evaluated at the start of every cycle, never
//! cached across cycles: the universe can grow (a new year appears) or
//! shrink. An enumeration failure is fatal to the cycle; a partial listing
//! is never treated as authoritative.

use std::sync::Arc;

use async_trait::async_trait;

use strata_core::PartitionKey;

use crate::error::{Error, Result};
use crate::source::Source;

/// Evaluates the partition-key source into an ordered sequence of keys.
#[async_trait]
pub trait PartitionEnumerator: Send + Sync {
    /// Returns the current partition universe.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Enumeration`] if the backing key source is
    /// unreachable; the cycle then aborts with no partitions touched.
    async fn enumerate(&self) -> Result<Vec<PartitionKey>>;
}

/// Collapses duplicate keys, preserving first-seen order.
#[must_use]
pub fn dedupe_keys(keys: Vec<PartitionKey>) -> Vec<PartitionKey> {
    let mut seen = std::collections::HashSet::new();
    keys.into_iter()
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

/// Enumerates a fixed list of keys.
///
/// Useful for tests and for deployments where the partition universe is
/// configuration, not data.
#[derive(Debug, Clone)]
pub struct FixedEnumerator {
    keys: Vec<PartitionKey>,
}

impl FixedEnumerator {
    /// Creates an enumerator over the given keys.
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<PartitionKey>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl PartitionEnumerator for FixedEnumerator {
    async fn enumerate(&self) -> Result<Vec<PartitionKey>> {
        Ok(self.keys.clone())
    }
}

/// Enumerates by listing keys from the source collaborator.
pub struct SourceListEnumerator {
    source: Arc<dyn Source>,
}

impl SourceListEnumerator {
    /// Creates an enumerator backed by the given source.
    #[must_use]
    pub fn new(source: Arc<dyn Source>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl PartitionEnumerator for SourceListEnumerator {
    async fn enumerate(&self) -> Result<Vec<PartitionKey>> {
        self.source
            .list_keys()
            .await
            .map_err(|e| Error::Enumeration {
                message: e.to_string(),
            })
    }
}
