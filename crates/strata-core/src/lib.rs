//! # strata-core
//!
//! Core abstractions for the Strata incremental refresh orchestrator.
//!
//! This crate provides the foundational types shared across Strata components:
//!
//! - **Identifiers**: Strongly-typed IDs for refresh cycles and load jobs
//! - **Partition Keys**: Opaque, ordered identifiers for table partitions
//! - **Fingerprints**: Cheap source-content signatures for change detection
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging bootstrap
//!
//! ## Example
//!
//! ```rust
//! use strata_core::{Fingerprint, PartitionKey, RunId};
//!
//! let key = PartitionKey::new("2024");
//! let run = RunId::generate();
//! let fp = Fingerprint::from_probe("etag-abc", 1024, None);
//! assert_eq!(fp, Fingerprint::from_probe("etag-abc", 1024, None));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod fingerprint;
pub mod id;
pub mod observability;
pub mod partition;

pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use id::{JobId, RunId};
pub use partition::PartitionKey;
