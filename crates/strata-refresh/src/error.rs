//! Error types for the refresh domain.
//!
//! The taxonomy mirrors the blast radius of each failure:
//!
//! - [`Error::Enumeration`] and [`Error::StateStore`] abort the whole cycle;
//!   nothing is touched.
//! - [`Error::Probe`], [`Error::Load`], and [`Error::Commit`] are scoped to
//!   one partition and never escalate to sibling partitions.

use strata_core::PartitionKey;

/// The result type used throughout strata-refresh.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in refresh operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The partition-key source could not be evaluated. Fatal to the cycle.
    #[error("enumeration failed: {message}")]
    Enumeration {
        /// Description of the failure.
        message: String,
    },

    /// A source metadata probe failed for one partition.
    #[error("probe failed for partition {key}: {message}")]
    Probe {
        /// The partition whose probe failed.
        key: PartitionKey,
        /// Description of the failure.
        message: String,
    },

    /// A load attempt failed for one partition.
    #[error("load failed for partition {key}: {message}")]
    Load {
        /// The partition whose load failed.
        key: PartitionKey,
        /// Description of the failure.
        message: String,
        /// Whether the failure looks transient (network, timeout) rather
        /// than permanent (malformed or unsupported data).
        retryable: bool,
    },

    /// A commit failed for one partition; the previously committed content
    /// remains visible.
    #[error("commit failed for partition {key}: {message}")]
    Commit {
        /// The partition whose commit failed.
        key: PartitionKey,
        /// Description of the failure.
        message: String,
    },

    /// The partition state store is unreachable. Fatal to the cycle: without
    /// the store there is no per-key mutual exclusion.
    #[error("state store error: {message}")]
    StateStore {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An invalid partition status transition was attempted.
    #[error("invalid state transition: {from} -> {to} ({reason})")]
    InvalidStateTransition {
        /// The current status.
        from: String,
        /// The attempted target status.
        to: String,
        /// The reason the transition is invalid.
        reason: String,
    },

    /// A cron schedule expression failed to parse.
    #[error("invalid cron schedule {expression:?}: {message}")]
    Schedule {
        /// The offending expression.
        expression: String,
        /// Description of the parse failure.
        message: String,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// The orchestrator is shutting down and cannot accept triggers.
    #[error("orchestrator is shut down")]
    Shutdown,

    /// An error from strata-core.
    #[error("core error: {0}")]
    Core(#[from] strata_core::error::Error),
}

impl Error {
    /// Creates a new state store error.
    #[must_use]
    pub fn state_store(message: impl Into<String>) -> Self {
        Self::StateStore {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new state store error with a source cause.
    #[must_use]
    pub fn state_store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::StateStore {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if a retry of the same operation could succeed.
    ///
    /// Cycle-fatal errors report false; the next trigger starts fresh anyway.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Load { retryable, .. } => *retryable,
            Self::Probe { .. } | Self::Commit { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn enumeration_error_display() {
        let err = Error::Enumeration {
            message: "key source unreachable".into(),
        };
        assert!(err.to_string().contains("enumeration failed"));
    }

    #[test]
    fn load_error_carries_retryability() {
        let transient = Error::Load {
            key: PartitionKey::new("2024"),
            message: "connection reset".into(),
            retryable: true,
        };
        let permanent = Error::Load {
            key: PartitionKey::new("2024"),
            message: "malformed record".into(),
            retryable: false,
        };
        assert!(transient.is_retryable());
        assert!(!permanent.is_retryable());
    }

    #[test]
    fn state_store_error_with_source() {
        let cause = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err = Error::state_store_with_source("failed to persist snapshot", cause);
        assert!(err.to_string().contains("state store error"));
        assert!(StdError::source(&err).is_some());
        assert!(!err.is_retryable());
    }

    #[test]
    fn commit_error_display_names_partition() {
        let err = Error::Commit {
            key: PartitionKey::new("2021"),
            message: "repoint rejected".into(),
        };
        assert!(err.to_string().contains("2021"));
    }
}
