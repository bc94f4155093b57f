//! Error types and result aliases shared across Strata.
//!
//! These are the primitive-level errors (identifiers, encodings). The
//! orchestration domain defines its own richer taxonomy in `strata-refresh`.

/// The result type used throughout `strata-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// An invalid partition key was provided.
    #[error("invalid partition key: {message}")]
    InvalidPartitionKey {
        /// Description of what made the key invalid.
        message: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },
}
