//! # Job Match Vector Store
//!
//! Versioned embedding storage for role anchors and job postings.
//!
//! ## Features
//!
//! - **Two collections** keyed by natural key (`job_title`, `job_id`)
//! - **Approximate search** via HNSW with an exact-scan path for small sets
//! - **Equality filters** over category, location and partition
//! - **Immutable snapshots** published with one atomic pointer swap
//! - **Persistent storage** with a `CURRENT` pointer as the commit point
//!
//! ## Architecture
//!
//! ```text
//! upsert ──> metadata table (revision++)
//!                 │
//!                 └─> build_snapshot ──> Snapshot vN (records + HNSW graph)
//!                                            │
//!                                            └─> publish: ArcSwap current
//!                                                   │
//! search ─────────────────────────────────────────>─┘ (never blocks)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use jobmatch_vector_store::{CancelFlag, EmbeddingStore, StoreConfig, JobPosting};
//!
//! fn main() -> jobmatch_vector_store::Result<()> {
//!     let store = EmbeddingStore::new(StoreConfig::with_dimension(3));
//!     store.upsert_posting(JobPosting {
//!         job_id: "j1".into(),
//!         title: "Data Engineer".into(),
//!         category: "Data Engineer".into(),
//!         location: "Remote".into(),
//!         description_embedding: vec![0.1, 0.7, 0.2],
//!         metadata: serde_json::Value::Null,
//!         ingestion_month: "2026-01".into(),
//!     })?;
//!
//!     let params = store.config().ann_build_params.clone();
//!     let snapshot = store.postings().build_snapshot(&params, &CancelFlag::new())?;
//!     store.postings().publish(snapshot)?;
//!
//!     for hit in store.posting_snapshot().search(&[0.1, 0.7, 0.2], 5, None)? {
//!         println!("{}: {:.3}", hit.record.job_id, hit.similarity);
//!     }
//!     Ok(())
//! }
//! ```

mod cancel;
mod collection;
mod config;
mod embeddings;
mod error;
mod hnsw_index;
pub mod paths;
mod persistence;
mod snapshot;
mod store;
mod types;

pub use cancel::CancelFlag;
pub use collection::{Collection, TableView};
pub use config::{AnnBuildParams, StoreConfig};
pub use embeddings::{cosine_similarity, dot, normalize, normalized, Embedder, StubEmbedder};
pub use error::{Result, VectorStoreError};
pub use hnsw_index::HnswIndex;
pub use persistence::{
    commit_current, list_snapshot_versions, load_snapshot, open_store, prune_snapshots,
    read_current_pointer, read_current_version, save_tables, write_atomic, write_snapshot,
    CurrentPointer, STORE_SCHEMA_VERSION,
};
pub use snapshot::{search, Snapshot, SnapshotHandle};
pub use store::{CollectionStatus, EmbeddingStore};
pub use types::{
    CollectionKind, FilterField, JobPosting, Record, RoleAnchor, SearchFilter, SearchHit,
    UpsertOutcome,
};
