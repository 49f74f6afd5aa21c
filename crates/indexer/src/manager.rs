use crate::config::IngestConfig;
use crate::error::{IndexerError, Result};
use crate::health::{append_failure_reason, write_health_snapshot, RebuildHealth};
use crate::rebuild::{RebuildOutcome, RebuildSlot};
use crate::retention::{expired_partitions, PartitionMonth};
use crate::source::{DocumentSource, SourceDocument};
use crate::stats::IngestReport;
use crate::validation::{AnchorInput, PostingInput, ValidationError};
use crate::write_lock::{acquire_write_lock, try_acquire_write_lock, DataDirLock};
use jobmatch_vector_store::{
    commit_current, prune_snapshots, write_snapshot, CancelFlag, Collection, CollectionKind,
    Embedder, EmbeddingStore, JobPosting, Record, StoreConfig, VectorStoreError,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Partitions removed by a retention pass and the rebuild that followed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetireReport {
    pub current_month: String,
    pub window_months: u32,
    /// Removed postings per retired partition
    pub retired: BTreeMap<String, usize>,
    pub rebuild: RebuildOutcome,
}

/// Applies ingestion batches to the store and keeps its snapshots up to date.
///
/// Batches write the metadata tables immediately. ANN search only sees those writes
/// after [`IngestionManager::rebuild_index`] publishes a new snapshot.
pub struct IngestionManager {
    store: Arc<EmbeddingStore>,
    config: IngestConfig,
    data_dir: Option<PathBuf>,
    write_lock: Option<DataDirLock>,
    anchor_rebuilds: RebuildSlot,
    posting_rebuilds: RebuildSlot,
}

impl IngestionManager {
    pub fn new(store: Arc<EmbeddingStore>, config: IngestConfig) -> Self {
        Self {
            store,
            config,
            data_dir: None,
            write_lock: None,
            anchor_rebuilds: RebuildSlot::default(),
            posting_rebuilds: RebuildSlot::default(),
        }
    }

    /// Persist tables, snapshots and health under `data_dir`.
    ///
    /// The caller is responsible for excluding other writers; prefer [`Self::open`].
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    /// Open the store persisted in `data_dir` and manage it there.
    ///
    /// Waits for any other manager on the same directory to be dropped, then loads the
    /// tables so writes committed by that manager are kept.
    pub async fn open(
        data_dir: impl AsRef<Path>,
        store_config: StoreConfig,
        config: IngestConfig,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let lock = acquire_write_lock(data_dir).await?;
        if lock.wait_ms() > 0 {
            log::debug!(
                "Waited {}ms for the write lock on {}",
                lock.wait_ms(),
                data_dir.display()
            );
        }
        Self::open_locked(data_dir, store_config, config, lock).await
    }

    /// Like [`Self::open`], but fails with [`IndexerError::DataDirLocked`] instead of
    /// waiting when another manager holds the directory.
    pub async fn try_open(
        data_dir: impl AsRef<Path>,
        store_config: StoreConfig,
        config: IngestConfig,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let lock = try_acquire_write_lock(data_dir).await?;
        Self::open_locked(data_dir, store_config, config, lock).await
    }

    async fn open_locked(
        data_dir: &Path,
        store_config: StoreConfig,
        config: IngestConfig,
        lock: DataDirLock,
    ) -> Result<Self> {
        let store = EmbeddingStore::open(data_dir, store_config).await?;
        let mut manager = Self::new(Arc::new(store), config).with_data_dir(data_dir);
        manager.write_lock = Some(lock);
        Ok(manager)
    }

    /// Milliseconds [`Self::open`] spent waiting for another writer, if opened on disk.
    #[must_use]
    pub fn write_lock_wait_ms(&self) -> Option<u64> {
        self.write_lock.as_ref().map(DataDirLock::wait_ms)
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }

    #[must_use]
    pub const fn config(&self) -> &IngestConfig {
        &self.config
    }

    #[must_use]
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Upsert every valid anchor in `batch`; malformed records are skipped and reported.
    pub async fn ingest_anchors(&self, batch: Vec<AnchorInput>) -> Result<IngestReport> {
        let started = Instant::now();
        let mut report = IngestReport::new(CollectionKind::Anchors);
        report.received = batch.len();
        let dimension = self.store.dimension();

        for (index, input) in batch.into_iter().enumerate() {
            let anchor = match input.validate(index, dimension) {
                Ok(anchor) => anchor,
                Err(err) => {
                    report.add_failure(err);
                    continue;
                }
            };
            let key = anchor.job_title.clone();
            match self.store.upsert_anchor(anchor) {
                Ok(outcome) => report.record(outcome),
                Err(err) => report.add_failure(rejected(CollectionKind::Anchors, index, &key, err)?),
            }
        }

        self.finish_batch(&mut report, started).await?;
        Ok(report)
    }

    /// Upsert every valid posting in `batch` under partition `ingestion_month`.
    ///
    /// Records sharing a `job_id` within the batch are reduced to the last one.
    pub async fn ingest_postings(
        &self,
        batch: Vec<PostingInput>,
        ingestion_month: &str,
    ) -> Result<IngestReport> {
        let started = Instant::now();
        let month = ingestion_month.parse::<PartitionMonth>()?.to_string();
        let mut report = IngestReport::new(CollectionKind::Postings);
        report.received = batch.len();
        let dimension = self.store.dimension();

        let mut valid: Vec<(usize, JobPosting)> = Vec::with_capacity(batch.len());
        for (index, input) in batch.into_iter().enumerate() {
            match input.validate(index, dimension, &month) {
                Ok(posting) => valid.push((index, posting)),
                Err(err) => report.add_failure(err),
            }
        }

        let last_position: HashMap<String, usize> = valid
            .iter()
            .enumerate()
            .map(|(position, (_, posting))| (posting.job_id.clone(), position))
            .collect();
        report.deduplicated = valid.len() - last_position.len();
        if report.deduplicated > 0 {
            log::debug!(
                "Dropped {} duplicate job_ids from batch for {month}",
                report.deduplicated
            );
        }

        for (position, (index, posting)) in valid.into_iter().enumerate() {
            if last_position.get(&posting.job_id) != Some(&position) {
                continue;
            }
            let key = posting.job_id.clone();
            match self.store.upsert_posting(posting) {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    report.add_failure(rejected(CollectionKind::Postings, index, &key, err)?);
                }
            }
        }

        self.finish_batch(&mut report, started).await?;
        Ok(report)
    }

    /// Pull every batch from `source`, embed it and ingest it as anchors.
    pub async fn ingest_anchors_from_source(
        &self,
        source: &mut dyn DocumentSource,
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<IngestReport> {
        let mut total = IngestReport::new(CollectionKind::Anchors);
        loop {
            let documents = source.next_batch(batch_size).await?;
            if documents.is_empty() {
                break;
            }
            let vectors = embed_documents(embedder, &documents).await?;
            let batch = documents
                .into_iter()
                .zip(vectors)
                .map(|(doc, vector)| doc.into_anchor(vector))
                .collect();
            total.merge(self.ingest_anchors(batch).await?);
        }
        log::info!(
            "Ingested {} anchors from source '{}' ({} failed)",
            total.committed,
            source.name(),
            total.failed.len()
        );
        Ok(total)
    }

    /// Pull every batch from `source`, embed it and ingest it as postings for `ingestion_month`.
    pub async fn ingest_postings_from_source(
        &self,
        source: &mut dyn DocumentSource,
        embedder: &dyn Embedder,
        ingestion_month: &str,
        batch_size: usize,
    ) -> Result<IngestReport> {
        let mut total = IngestReport::new(CollectionKind::Postings);
        loop {
            let documents = source.next_batch(batch_size).await?;
            if documents.is_empty() {
                break;
            }
            let vectors = embed_documents(embedder, &documents).await?;
            let batch = documents
                .into_iter()
                .zip(vectors)
                .map(|(doc, vector)| doc.into_posting(vector))
                .collect();
            total.merge(self.ingest_postings(batch, ingestion_month).await?);
        }
        log::info!(
            "Ingested {} postings for {ingestion_month} from source '{}' ({} failed)",
            total.committed,
            source.name(),
            total.failed.len()
        );
        Ok(total)
    }

    pub async fn rebuild_index(&self, kind: CollectionKind) -> Result<RebuildOutcome> {
        self.rebuild_index_with_cancel(kind, &CancelFlag::new()).await
    }

    /// Build a snapshot of the collection's current records and publish it.
    ///
    /// `cancel` is honoured until publish; once the snapshot is committed the call
    /// completes regardless. A request arriving while a rebuild of the same collection
    /// runs returns [`RebuildOutcome::Coalesced`] and is served by one extra pass.
    pub async fn rebuild_index_with_cancel(
        &self,
        kind: CollectionKind,
        cancel: &CancelFlag,
    ) -> Result<RebuildOutcome> {
        let Some(mut guard) = self.slot(kind).begin() else {
            log::info!("Rebuild of {kind} already in progress; request coalesced");
            return Ok(RebuildOutcome::Coalesced { collection: kind });
        };

        let mut previous: Option<RebuildOutcome> = None;
        loop {
            let result = match kind {
                CollectionKind::Anchors => {
                    self.rebuild_collection(EmbeddingStore::anchors, cancel).await
                }
                CollectionKind::Postings => {
                    self.rebuild_collection(EmbeddingStore::postings, cancel).await
                }
            };
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.record_failure(kind, &err).await;
                    return Err(err);
                }
            };
            // A coalesced pass with nothing new to index keeps reporting the earlier publish.
            let outcome = match (outcome, previous.take()) {
                (RebuildOutcome::Unchanged { .. }, Some(earlier)) => earlier,
                (outcome, _) => outcome,
            };
            if !guard.take_pending() {
                return Ok(outcome);
            }
            log::debug!("Running coalesced {kind} rebuild");
            previous = Some(outcome);
        }
    }

    pub async fn rebuild_all(&self) -> Result<Vec<RebuildOutcome>> {
        let mut outcomes = Vec::with_capacity(CollectionKind::ALL.len());
        for kind in CollectionKind::ALL {
            outcomes.push(self.rebuild_index(kind).await?);
        }
        Ok(outcomes)
    }

    /// Republish the most recently superseded snapshot of `kind`; returns its version.
    pub async fn rollback(&self, kind: CollectionKind) -> Result<u64> {
        let version = match kind {
            CollectionKind::Anchors => self.store.anchors().rollback()?.version(),
            CollectionKind::Postings => self.store.postings().rollback()?.version(),
        };
        if let Some(dir) = &self.data_dir {
            commit_current(dir, kind, version).await?;
        }
        Ok(version)
    }

    /// Delete partitions older than the retention window, then rebuild postings.
    ///
    /// `window` defaults to the configured `retention_window_months`.
    pub async fn retire_partitions(
        &self,
        current_month: &str,
        window: Option<u32>,
    ) -> Result<RetireReport> {
        let current = current_month.parse::<PartitionMonth>()?;
        let window = window.unwrap_or(self.config.retention_window_months);
        let partitions = self.store.partitions();
        let expired = expired_partitions(partitions.keys().map(String::as_str), current, window);

        let mut retired = BTreeMap::new();
        for tag in expired {
            let removed = self.store.delete_partition(&tag);
            retired.insert(tag, removed);
        }
        if !retired.is_empty() {
            self.persist_tables().await?;
        }
        log::info!(
            "Retention at {current} (window {window}): retired {} partitions",
            retired.len()
        );

        let rebuild = self.rebuild_index(CollectionKind::Postings).await?;
        Ok(RetireReport {
            current_month: current.to_string(),
            window_months: window,
            retired,
            rebuild,
        })
    }

    fn slot(&self, kind: CollectionKind) -> &RebuildSlot {
        match kind {
            CollectionKind::Anchors => &self.anchor_rebuilds,
            CollectionKind::Postings => &self.posting_rebuilds,
        }
    }

    async fn rebuild_collection<R: Record>(
        &self,
        select: fn(&EmbeddingStore) -> &Collection<R>,
        cancel: &CancelFlag,
    ) -> Result<RebuildOutcome> {
        if cancel.is_cancelled() {
            return Err(IndexerError::Cancelled);
        }

        let collection = select(&self.store);
        let current = collection.current_snapshot();
        if current.version() > 0 && current.source_revision() == collection.revision() {
            log::debug!("{} snapshot v{} is up to date", R::KIND, current.version());
            return Ok(RebuildOutcome::Unchanged {
                collection: R::KIND,
                version: current.version(),
            });
        }
        drop(current);

        let started = Instant::now();
        let store = Arc::clone(&self.store);
        let params = store.config().ann_build_params.clone();
        let build_cancel = cancel.clone();
        let snapshot = tokio::task::spawn_blocking(move || {
            select(&store).build_snapshot(&params, &build_cancel)
        })
        .await?
        .map_err(IndexerError::from_store)?;

        if cancel.is_cancelled() {
            log::info!("Discarding cancelled {} snapshot v{}", R::KIND, snapshot.version());
            return Err(IndexerError::Cancelled);
        }

        let mut snapshot_path = None;
        if let Some(dir) = &self.data_dir {
            let path = write_snapshot(dir, &snapshot).await?;
            if cancel.is_cancelled() {
                if let Err(err) = tokio::fs::remove_file(&path).await {
                    log::debug!("Failed to remove cancelled snapshot {}: {err}", path.display());
                }
                return Err(IndexerError::Cancelled);
            }
            commit_current(dir, R::KIND, snapshot.version()).await?;
            snapshot_path = Some(path);
        }

        let handle = collection.publish(snapshot)?;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if let Some(dir) = &self.data_dir {
            prune_snapshots(dir, R::KIND, &self.store.live_versions(R::KIND)).await?;
            write_health_snapshot(
                dir,
                RebuildHealth {
                    collection: R::KIND,
                    version: handle.version(),
                    records: handle.len(),
                    duration_ms,
                    snapshot_path: snapshot_path.as_deref(),
                },
                "rebuild",
            )
            .await?;
        }

        Ok(RebuildOutcome::Published {
            collection: R::KIND,
            version: handle.version(),
            records: handle.len(),
            duration_ms,
        })
    }

    async fn record_failure(&self, kind: CollectionKind, err: &IndexerError) {
        if matches!(err, IndexerError::Cancelled) {
            log::info!("Rebuild of {kind} cancelled before publish");
            return;
        }
        log::warn!("Rebuild of {kind} failed: {err}");
        let Some(dir) = &self.data_dir else {
            return;
        };
        if let Err(write_err) = append_failure_reason(dir, "rebuild", &format!("{kind}: {err}")).await
        {
            log::warn!("Failed to record rebuild failure: {write_err}");
        }
    }

    async fn finish_batch(&self, report: &mut IngestReport, started: Instant) -> Result<()> {
        if report.changed() {
            self.persist_tables().await?;
        }
        report.time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        log::info!(
            "Ingested {} batch: {} committed, {} unchanged, {} deduplicated, {} failed",
            report.collection,
            report.committed,
            report.unchanged,
            report.deduplicated,
            report.failed.len()
        );
        Ok(())
    }

    async fn persist_tables(&self) -> Result<()> {
        if let Some(dir) = &self.data_dir {
            self.store.save(dir).await?;
        }
        Ok(())
    }
}

fn rejected(
    collection: CollectionKind,
    index: usize,
    key: &str,
    err: VectorStoreError,
) -> Result<ValidationError> {
    ValidationError::from_store(collection, index, key, &err)
        .ok_or_else(|| IndexerError::from_store(err))
}

async fn embed_documents(
    embedder: &dyn Embedder,
    documents: &[SourceDocument],
) -> Result<Vec<Vec<f32>>> {
    let texts: Vec<String> = documents.iter().map(|doc| doc.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts).await?;
    if vectors.len() != documents.len() {
        return Err(IndexerError::Other(format!(
            "embedder returned {} vectors for {} documents",
            vectors.len(),
            documents.len()
        )));
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::VecSource;
    use crate::validation::ValidationReason;
    use jobmatch_vector_store::{SearchFilter, StubEmbedder};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn manager(dimension: usize) -> IngestionManager {
        let store = EmbeddingStore::new(StoreConfig::with_dimension(dimension));
        IngestionManager::new(Arc::new(store), IngestConfig::default())
    }

    fn posting(id: &str, category: &str, embedding: Vec<f32>) -> PostingInput {
        PostingInput {
            job_id: id.to_string(),
            title: format!("{category} role"),
            category: category.to_string(),
            location: "Remote".to_string(),
            description_embedding: embedding,
            metadata: serde_json::json!({"company": "Acme"}),
            ingestion_month: None,
        }
    }

    fn anchor(title: &str, embedding: Vec<f32>) -> AnchorInput {
        AnchorInput {
            job_title: title.to_string(),
            category: "Engineering".to_string(),
            priority_tier: "High".to_string(),
            anchor_embedding: embedding,
            definition: serde_json::json!({"skills": ["python"]}),
            keywords: vec!["python".to_string()],
        }
    }

    #[tokio::test]
    async fn one_malformed_record_does_not_sink_the_batch() {
        let manager = manager(2);
        let report = manager
            .ingest_postings(
                vec![
                    posting("j1", "A", vec![1.0, 0.0]),
                    posting("j2", "A", vec![1.0, 0.0, 0.0]),
                    posting("j3", "B", vec![0.0, 1.0]),
                    posting("j4", "B", vec![0.5, 0.5]),
                ],
                "2026-01",
            )
            .await
            .unwrap();

        assert_eq!(report.committed, 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key.as_deref(), Some("j2"));
        assert_eq!(report.failed[0].index, 1);
        assert!(matches!(
            report.failed[0].reason,
            ValidationReason::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(manager.store().postings().len(), 3);
    }

    #[tokio::test]
    async fn duplicate_job_ids_keep_the_last_record() {
        let manager = manager(2);
        let report = manager
            .ingest_postings(
                vec![
                    posting("j1", "First", vec![1.0, 0.0]),
                    posting("j2", "A", vec![0.0, 1.0]),
                    posting("j1", "Last", vec![0.0, 1.0]),
                ],
                "2026-01",
            )
            .await
            .unwrap();

        assert_eq!(report.committed, 2);
        assert_eq!(report.deduplicated, 1);
        let stored = manager.store().postings().get("j1").unwrap();
        assert_eq!(stored.category, "Last");
    }

    #[tokio::test]
    async fn invalid_month_rejects_the_call() {
        let manager = manager(2);
        let err = manager
            .ingest_postings(vec![posting("j1", "A", vec![1.0, 0.0])], "January")
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::InvalidMonth(_)));
        assert!(manager.store().postings().is_empty());
    }

    #[tokio::test]
    async fn reingesting_identical_records_changes_nothing() {
        let manager = manager(2);
        let batch = vec![anchor("Data Engineer", vec![1.0, 0.0])];
        manager.ingest_anchors(batch.clone()).await.unwrap();
        let first = manager.rebuild_index(CollectionKind::Anchors).await.unwrap();
        let version = first.published_version().unwrap();
        let revision = manager.store().anchors().revision();

        let report = manager.ingest_anchors(batch).await.unwrap();
        assert_eq!(report.committed, 0);
        assert_eq!(report.unchanged, 1);
        assert_eq!(manager.store().anchors().revision(), revision);

        let second = manager.rebuild_index(CollectionKind::Anchors).await.unwrap();
        assert_eq!(
            second,
            RebuildOutcome::Unchanged {
                collection: CollectionKind::Anchors,
                version
            }
        );
    }

    #[tokio::test]
    async fn ingested_postings_reach_search_after_rebuild() {
        let manager = manager(2);
        manager
            .ingest_postings(vec![posting("j1", "A", vec![1.0, 0.0])], "2026-01")
            .await
            .unwrap();

        let postings = manager.store().postings();
        assert_eq!(postings.filter_keys(&SearchFilter::category("A")), vec!["j1"]);
        assert!(manager.store().posting_snapshot().is_empty());

        manager.rebuild_index(CollectionKind::Postings).await.unwrap();
        let hits = manager
            .store()
            .posting_snapshot()
            .search(&[1.0, 0.0], 1, None)
            .unwrap();
        assert_eq!(hits[0].record.job_id, "j1");
    }

    #[tokio::test]
    async fn cancelled_rebuild_publishes_nothing() {
        let manager = manager(2);
        manager
            .ingest_anchors(vec![anchor("A", vec![1.0, 0.0])])
            .await
            .unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = manager
            .rebuild_index_with_cancel(CollectionKind::Anchors, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Cancelled));
        assert_eq!(manager.store().anchor_snapshot().version(), 0);

        let outcome = manager.rebuild_index(CollectionKind::Anchors).await.unwrap();
        assert!(outcome.published_version().is_some());
    }

    #[tokio::test]
    async fn retirement_removes_old_partitions_from_search() {
        let manager = manager(2);
        manager
            .ingest_postings(vec![posting("old", "A", vec![1.0, 0.0])], "2025-12")
            .await
            .unwrap();
        manager
            .ingest_postings(vec![posting("new", "A", vec![0.9, 0.1])], "2026-03")
            .await
            .unwrap();
        manager.rebuild_index(CollectionKind::Postings).await.unwrap();
        assert_eq!(manager.store().posting_snapshot().len(), 2);

        let report = manager.retire_partitions("2026-03", Some(3)).await.unwrap();
        assert_eq!(report.retired.get("2025-12"), Some(&1));
        assert!(report.rebuild.published_version().is_some());

        let hits = manager
            .store()
            .posting_snapshot()
            .search(&[1.0, 0.0], 5, None)
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.record.job_id.as_str()).collect();
        assert_eq!(ids, vec!["new"]);
    }

    #[tokio::test]
    async fn persisted_rebuild_is_served_after_reopen() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::with_dimension(2);
        {
            let manager =
                IngestionManager::open(tmp.path(), config.clone(), IngestConfig::default())
                    .await
                    .unwrap();
            manager
                .ingest_anchors(vec![anchor("A", vec![1.0, 0.0]), anchor("B", vec![0.0, 1.0])])
                .await
                .unwrap();
            manager.rebuild_index(CollectionKind::Anchors).await.unwrap();
            manager
                .ingest_anchors(vec![anchor("C", vec![0.7, 0.7])])
                .await
                .unwrap();
            manager.rebuild_index(CollectionKind::Anchors).await.unwrap();
            manager.rollback(CollectionKind::Anchors).await.unwrap();
        }

        let reopened = IngestionManager::open(tmp.path(), config, IngestConfig::default())
            .await
            .unwrap();
        assert_eq!(reopened.store().anchors().len(), 3);
        assert_eq!(reopened.store().anchor_snapshot().len(), 2);

        let health = crate::health::read_health_snapshot(tmp.path())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(health.collection, Some(CollectionKind::Anchors));

        let outcome = reopened.rebuild_index(CollectionKind::Anchors).await.unwrap();
        assert_eq!(reopened.store().anchor_snapshot().len(), 3);
        assert!(outcome.published_version().unwrap() > 2);
    }

    fn postings_for(prefix: &str, count: usize) -> Vec<PostingInput> {
        (0..count)
            .map(|i| posting(&format!("{prefix}-{i}"), prefix, vec![1.0, i as f32]))
            .collect()
    }

    #[tokio::test]
    async fn second_writer_on_a_data_dir_is_refused() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::with_dimension(2);
        let first = IngestionManager::open(tmp.path(), config.clone(), IngestConfig::default())
            .await
            .unwrap();
        assert!(first.write_lock_wait_ms().is_some());

        let err = IngestionManager::try_open(tmp.path(), config.clone(), IngestConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, IndexerError::DataDirLocked(_)));

        drop(first);
        IngestionManager::try_open(tmp.path(), config, IngestConfig::default())
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sequential_writers_keep_each_others_postings() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::with_dimension(2);
        let alpha = IngestionManager::open(tmp.path(), config.clone(), IngestConfig::default())
            .await
            .unwrap();

        let dir = tmp.path().to_path_buf();
        let beta_config = config.clone();
        let beta = tokio::spawn(async move {
            let manager = IngestionManager::open(&dir, beta_config, IngestConfig::default()).await?;
            manager
                .ingest_postings(postings_for("beta", 10), "2026-01")
                .await?;
            manager.rebuild_index(CollectionKind::Postings).await
        });

        alpha
            .ingest_postings(postings_for("alpha", 10), "2026-01")
            .await
            .unwrap();
        alpha.rebuild_index(CollectionKind::Postings).await.unwrap();
        assert!(!beta.is_finished());
        drop(alpha);

        beta.await.unwrap().unwrap();
        let reopened = IngestionManager::open(tmp.path(), config, IngestConfig::default())
            .await
            .unwrap();
        assert_eq!(reopened.store().postings().len(), 20);
        assert_eq!(reopened.store().posting_snapshot().len(), 20);
    }

    #[tokio::test]
    async fn source_documents_are_embedded_and_ingested() {
        let manager = manager(8);
        let embedder = StubEmbedder::new(8);
        let documents = (0..5)
            .map(|i| SourceDocument {
                key: format!("j{i}"),
                text: format!("Senior data engineer {i}"),
                category: "Data Engineer".to_string(),
                ..SourceDocument::default()
            })
            .collect();
        let mut source = VecSource::new("fixture", documents);

        let report = manager
            .ingest_postings_from_source(&mut source, &embedder, "2026-01", 2)
            .await
            .unwrap();
        assert_eq!(report.received, 5);
        assert_eq!(report.committed, 5);
        assert_eq!(manager.store().partitions().get("2026-01"), Some(&5));
    }
}
