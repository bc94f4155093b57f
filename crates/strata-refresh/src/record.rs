//! Raw and transformed record types.
//!
//! The orchestrator treats record contents as opaque JSON payloads: the
//! transform is the only component that looks inside. Keeping the payload
//! schemaless keeps the refresh machinery independent of any particular
//! table layout.

use serde::{Deserialize, Serialize};

/// One record as read from the source, before transformation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(serde_json::Value);

impl RawRecord {
    /// Wraps a JSON payload as a raw record.
    #[must_use]
    pub const fn new(payload: serde_json::Value) -> Self {
        Self(payload)
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &serde_json::Value {
        &self.0
    }

    /// Consumes the record, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for RawRecord {
    fn from(payload: serde_json::Value) -> Self {
        Self(payload)
    }
}

/// One transformed row, ready to be staged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(serde_json::Value);

impl Row {
    /// Wraps a JSON payload as a row.
    #[must_use]
    pub const fn new(payload: serde_json::Value) -> Self {
        Self(payload)
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<serde_json::Value> for Row {
    fn from(payload: serde_json::Value) -> Self {
        Self(payload)
    }
}
