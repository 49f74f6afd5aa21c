//! # Job Match Indexer
//!
//! Batch ingestion, snapshot rebuilds and partition retention for the embedding store.
//!
//! ## Pipeline
//!
//! One manager writes a data directory at a time: [`IngestionManager::open`] holds an
//! exclusive lock on `<data_dir>/write.lock` until the manager is dropped.
//!
//! ```text
//! DocumentSource / JSONL batch
//!     │
//!     ├──> Validation (key, dimension, partition)
//!     │      └─> malformed records skipped and reported
//!     │
//!     ├──> Metadata table upsert (last write wins per key)
//!     │
//!     └──> rebuild_index (one per collection, coalesced)
//!            └─> write snapshot ──> CURRENT ──> atomic publish
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use jobmatch_indexer::{IngestConfig, IngestionManager, PostingInput};
//! use jobmatch_vector_store::{CollectionKind, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> jobmatch_indexer::Result<()> {
//!     let manager =
//!         IngestionManager::open(".jobmatch", StoreConfig::default(), IngestConfig::default())
//!             .await?;
//!     let batch: Vec<PostingInput> = Vec::new();
//!     let report = manager.ingest_postings(batch, "2026-01").await?;
//!     manager.rebuild_index(CollectionKind::Postings).await?;
//!
//!     println!("committed {} postings", report.committed);
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod health;
mod manager;
mod rebuild;
mod retention;
mod source;
mod stats;
mod validation;
mod write_lock;

pub use config::IngestConfig;
pub use error::{IndexerError, Result};
pub use health::{
    append_failure_reason, read_health_snapshot, write_health_snapshot, HealthSnapshot,
    RebuildHealth,
};
pub use manager::{IngestionManager, RetireReport};
pub use rebuild::RebuildOutcome;
pub use retention::{expired_partitions, PartitionMonth};
pub use source::{DocumentSource, SourceDocument, VecSource};
pub use stats::IngestReport;
pub use validation::{AnchorInput, PostingInput, ValidationError, ValidationReason};
