//! Opaque partition key type.
//!
//! A partition key identifies one disjoint, independently-refreshable slice
//! of the target table (a year, a date, a region). The orchestrator never
//! interprets the key's structure; it only compares, orders, and hashes it.
//! Ordering follows the key's lexicographic byte order, which keeps
//! enumeration results and reports deterministic.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// An opaque, comparable identifier for one table partition.
///
/// Keys are produced fresh on every enumeration and never mutated.
/// Within one enumeration result a key is unique; duplicates collapse.
///
/// # Example
///
/// ```rust
/// use strata_core::PartitionKey;
///
/// let a = PartitionKey::new("2023");
/// let b = PartitionKey::new("2024");
/// assert!(a < b);
/// assert_eq!(a.as_str(), "2023");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Creates a new partition key.
    ///
    /// # Panics
    ///
    /// Does not panic; empty keys are permitted here and rejected by
    /// [`PartitionKey::parse`] where validated input is required.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Parses a partition key, rejecting empty or whitespace-only input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPartitionKey`] if the key is empty.
    pub fn parse(key: &str) -> Result<Self> {
        if key.trim().is_empty() {
            return Err(Error::InvalidPartitionKey {
                message: "partition key must not be empty".into(),
            });
        }
        Ok(Self(key.to_string()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for PartitionKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_order_lexicographically() {
        let mut keys = vec![
            PartitionKey::new("2022"),
            PartitionKey::new("2020"),
            PartitionKey::new("2021"),
        ];
        keys.sort();
        assert_eq!(
            keys.iter().map(PartitionKey::as_str).collect::<Vec<_>>(),
            vec!["2020", "2021", "2022"]
        );
    }

    #[test]
    fn parse_rejects_empty() {
        assert!(PartitionKey::parse("").is_err());
        assert!(PartitionKey::parse("   ").is_err());
        assert!(PartitionKey::parse("2024").is_ok());
    }

    #[test]
    fn serde_is_transparent() {
        let key = PartitionKey::new("2024");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"2024\"");
        let back: PartitionKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
