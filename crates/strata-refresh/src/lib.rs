//! # strata-refresh
//!
//! Incremental, partition-aware refresh orchestration for a partitioned
//! analytical table fed from remote object storage.
//!
//! This crate implements the refresh domain, providing:
//!
//! - **Partition Enumeration**: Re-evaluates the partition universe each cycle
//! - **Freshness Evaluation**: Skips unchanged partitions from cheap probes
//! - **Streaming Load**: Bounded-memory source-to-staging pipelines
//! - **Atomic Replacement**: Single-step repoint so readers never see a mix
//! - **Scheduling**: Cron and manual triggers driving one shared state machine
//!
//! ## Guarantees
//!
//! - **Idempotent**: An unchanged partition costs one metadata probe, never a load
//! - **Atomic**: Concurrent readers observe fully-old or fully-new content
//! - **Isolated**: One partition's failure never blocks its siblings
//! - **Durable**: Partition state survives restarts; stale data is never blanked
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use strata_refresh::config::RefreshConfig;
//! use strata_refresh::enumerate::FixedEnumerator;
//! use strata_refresh::engine::MemoryEngine;
//! use strata_refresh::error::Result;
//! use strata_refresh::orchestrator::Orchestrator;
//! use strata_refresh::run::RunTrigger;
//! use strata_refresh::source::MemorySource;
//! use strata_refresh::store::memory::MemoryStateStore;
//! use strata_refresh::transform::IdentityTransform;
//!
//! # async fn demo() -> Result<()> {
//! let source = Arc::new(MemorySource::new());
//! let orchestrator = Orchestrator::new(
//!     Arc::new(FixedEnumerator::new(["2023", "2024"])),
//!     Arc::new(MemoryStateStore::new()),
//!     source,
//!     Arc::new(MemoryEngine::new()),
//!     Arc::new(IdentityTransform),
//!     RefreshConfig::default(),
//! );
//!
//! let report = orchestrator.run_cycle(RunTrigger::manual(false)).await?;
//! println!("refreshed {} partitions", report.record.partitions_refreshed);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod engine;
pub mod enumerate;
pub mod error;
pub mod executor;
pub mod freshness;
pub mod metrics;
pub mod orchestrator;
pub mod record;
pub mod replacer;
pub mod run;
pub mod source;
pub mod state;
pub mod store;
pub mod timer;
pub mod transform;
