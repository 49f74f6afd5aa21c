use crate::collection::Collection;
use crate::config::StoreConfig;
use crate::error::Result;
use crate::snapshot::SnapshotHandle;
use crate::types::{CollectionKind, JobPosting, RoleAnchor, UpsertOutcome};
use serde::Serialize;
use std::collections::BTreeMap;

/// Snapshot summary of one collection, suitable for status output.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStatus {
    pub kind: CollectionKind,
    pub records: usize,
    pub revision: u64,
    pub snapshot_version: u64,
    pub snapshot_records: usize,
    pub snapshot_source_revision: u64,
    pub snapshot_built_at_unix_ms: u64,
    pub retained_versions: Vec<u64>,
}

impl CollectionStatus {
    /// True when the served snapshot lags behind the metadata table.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.revision != self.snapshot_source_revision
    }
}

/// The role-anchor and job-posting collections under one dimension.
pub struct EmbeddingStore {
    config: StoreConfig,
    anchors: Collection<RoleAnchor>,
    postings: Collection<JobPosting>,
}

impl EmbeddingStore {
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        let dimension = config.embedding_dimension;
        let params = config.ann_build_params.clone();
        let retained = config.retained_snapshots;
        Self {
            anchors: Collection::new(dimension, params.clone(), retained),
            postings: Collection::new(dimension, params, retained),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.config.embedding_dimension
    }

    #[must_use]
    pub const fn anchors(&self) -> &Collection<RoleAnchor> {
        &self.anchors
    }

    #[must_use]
    pub const fn postings(&self) -> &Collection<JobPosting> {
        &self.postings
    }

    /// Insert or fully replace a role anchor keyed by `job_title`.
    pub fn upsert_anchor(&self, anchor: RoleAnchor) -> Result<UpsertOutcome> {
        self.anchors.upsert(anchor)
    }

    /// Insert or fully replace a posting keyed by `job_id`, moving it to its new partition.
    pub fn upsert_posting(&self, posting: JobPosting) -> Result<UpsertOutcome> {
        self.postings.upsert(posting)
    }

    #[must_use]
    pub fn anchor_snapshot(&self) -> SnapshotHandle<RoleAnchor> {
        self.anchors.current_snapshot()
    }

    #[must_use]
    pub fn posting_snapshot(&self) -> SnapshotHandle<JobPosting> {
        self.postings.current_snapshot()
    }

    /// Remove every posting in `ingestion_month`.
    ///
    /// The served index keeps those vectors until the next rebuild is published.
    pub fn delete_partition(&self, ingestion_month: &str) -> usize {
        let removed = self
            .postings
            .remove_where(|posting| posting.ingestion_month == ingestion_month);
        log::info!("Deleted partition {ingestion_month}: {removed} postings");
        removed
    }

    /// Posting counts per partition in the metadata table.
    #[must_use]
    pub fn partitions(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for posting in self.postings.view().records {
            *counts.entry(posting.ingestion_month.clone()).or_insert(0) += 1;
        }
        counts
    }

    #[must_use]
    pub fn status(&self, kind: CollectionKind) -> CollectionStatus {
        match kind {
            CollectionKind::Anchors => collection_status(&self.anchors),
            CollectionKind::Postings => collection_status(&self.postings),
        }
    }
}

fn collection_status<R: crate::types::Record>(collection: &Collection<R>) -> CollectionStatus {
    let snapshot = collection.current_snapshot();
    CollectionStatus {
        kind: R::KIND,
        records: collection.len(),
        revision: collection.revision(),
        snapshot_version: snapshot.version(),
        snapshot_records: snapshot.len(),
        snapshot_source_revision: snapshot.source_revision(),
        snapshot_built_at_unix_ms: snapshot.built_at_unix_ms(),
        retained_versions: collection.retained_versions(),
    }
}
