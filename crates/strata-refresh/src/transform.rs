//! Pluggable row transformation.
//!
//! The raw-to-transformed mapping is a pure strategy object injected into the
//! load executor, never hard-coded. A transform may fan out (one raw record
//! becomes several rows), fan in (a record is filtered to nothing), or map
//! one-to-one. Transform failures are treated as permanent: malformed input
//! will not fix itself on retry.

use crate::record::{RawRecord, Row};

/// Error raised by a transform for an unprocessable record.
#[derive(Debug, Clone, thiserror::Error)]
#[error("transform failed: {message}")]
pub struct TransformError {
    /// Description of why the record could not be processed.
    pub message: String,
}

impl TransformError {
    /// Creates a new transform error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A pure mapping from one raw record to zero, one, or many rows.
///
/// Implementations must be deterministic and side-effect free: the executor
/// may re-run a transform on retry and expects identical output.
pub trait Transform: Send + Sync {
    /// Applies the transform to one raw record.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError`] for records that cannot be processed;
    /// the executor classifies these as permanent load failures.
    fn apply(&self, record: RawRecord) -> Result<Vec<Row>, TransformError>;
}

/// Passes each record through unchanged as a single row.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransform;

impl Transform for IdentityTransform {
    fn apply(&self, record: RawRecord) -> Result<Vec<Row>, TransformError> {
        Ok(vec![Row::new(record.into_payload())])
    }
}

/// Adapts a plain function or closure into a [`Transform`].
pub struct FnTransform<F>(F);

impl<F> FnTransform<F>
where
    F: Fn(RawRecord) -> Result<Vec<Row>, TransformError> + Send + Sync,
{
    /// Wraps the given function as a transform.
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(RawRecord) -> Result<Vec<Row>, TransformError> + Send + Sync,
{
    fn apply(&self, record: RawRecord) -> Result<Vec<Row>, TransformError> {
        (self.0)(record)
    }
}
