use crate::cancel::CancelFlag;
use crate::config::AnnBuildParams;
use crate::error::{Result, VectorStoreError};
use crate::snapshot::{Snapshot, SnapshotHandle};
use crate::types::{Record, SearchFilter, UpsertOutcome};
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Consistent copy of a collection's metadata table at one revision.
#[derive(Debug, Clone)]
pub struct TableView<R> {
    pub revision: u64,
    pub records: Vec<Arc<R>>,
}

#[derive(Debug)]
struct Table<R> {
    records: BTreeMap<String, Arc<R>>,
    revision: u64,
}

/// One logical collection: a mutable metadata table plus the published ANN snapshot.
///
/// Writes land in the table immediately. Search only sees them once a rebuilt snapshot
/// is published; the current-snapshot pointer is the only shared state on the read path.
pub struct Collection<R: Record> {
    dimension: usize,
    table: RwLock<Table<R>>,
    current: ArcSwap<Snapshot<R>>,
    /// Superseded snapshots, newest at the back
    retired: Mutex<VecDeque<SnapshotHandle<R>>>,
    retained: usize,
    next_version: AtomicU64,
}

impl<R: Record> Collection<R> {
    #[must_use]
    pub fn new(dimension: usize, params: AnnBuildParams, retained: usize) -> Self {
        Self {
            dimension,
            table: RwLock::new(Table {
                records: BTreeMap::new(),
                revision: 0,
            }),
            current: ArcSwap::from_pointee(Snapshot::empty(dimension, params)),
            retired: Mutex::new(VecDeque::new()),
            retained,
            next_version: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Reject a record the store must never hold.
    pub fn validate(&self, record: &R) -> Result<()> {
        if record.key().trim().is_empty() {
            return Err(VectorStoreError::MissingKey(R::KIND));
        }
        let actual = record.embedding().len();
        if actual != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        check_finite(record.embedding())
    }

    /// Insert or fully replace one record by natural key.
    pub fn upsert(&self, record: R) -> Result<UpsertOutcome> {
        self.validate(&record)?;
        let mut table = self.table.write();
        Ok(apply_upsert(&mut table, record))
    }

    /// Apply every record or none: the batch is validated before the table is touched.
    pub fn upsert_batch(&self, records: Vec<R>) -> Result<Vec<UpsertOutcome>> {
        for record in &records {
            self.validate(record)?;
        }
        let mut table = self.table.write();
        Ok(records
            .into_iter()
            .map(|record| apply_upsert(&mut table, record))
            .collect())
    }

    /// Remove every record matching `predicate`; returns how many were removed.
    pub fn remove_where(&self, predicate: impl Fn(&R) -> bool) -> usize {
        let mut table = self.table.write();
        let before = table.records.len();
        table.records.retain(|_, record| !predicate(record));
        let removed = before - table.records.len();
        if removed > 0 {
            table.revision += 1;
        }
        removed
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<R>> {
        self.table.read().records.get(key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().records.is_empty()
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.table.read().revision
    }

    /// Keys of table records matching `filter`, visible immediately after ingestion.
    #[must_use]
    pub fn filter_keys(&self, filter: &SearchFilter) -> Vec<String> {
        self.table
            .read()
            .records
            .values()
            .filter(|record| filter.matches(record.as_ref()))
            .map(|record| record.key().to_string())
            .collect()
    }

    #[must_use]
    pub fn view(&self) -> TableView<R> {
        let table = self.table.read();
        TableView {
            revision: table.revision,
            records: table.records.values().cloned().collect(),
        }
    }

    /// Latest published snapshot; never blocks on writers or rebuilds.
    #[must_use]
    pub fn current_snapshot(&self) -> SnapshotHandle<R> {
        self.current.load_full()
    }

    /// Build (but do not publish) a snapshot of the table as it is right now.
    pub fn build_snapshot(&self, params: &AnnBuildParams, cancel: &CancelFlag) -> Result<Snapshot<R>> {
        let view = self.view();
        let version = self.allocate_version();
        log::debug!(
            "Building {} snapshot v{version} from revision {} ({} records)",
            R::KIND,
            view.revision,
            view.records.len()
        );
        Snapshot::build(
            version,
            view.revision,
            self.dimension,
            view.records,
            params,
            cancel,
        )
    }

    pub fn allocate_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst)
    }

    /// Make `snapshot` current in one atomic swap. Older versions are refused.
    pub fn publish(&self, snapshot: Snapshot<R>) -> Result<SnapshotHandle<R>> {
        let mut retired = self.retired.lock();
        let current = self.current.load();
        if snapshot.version() <= current.version() {
            return Err(VectorStoreError::StaleSnapshot {
                kind: R::KIND,
                current: current.version(),
                attempted: snapshot.version(),
            });
        }
        drop(current);

        let handle = Arc::new(snapshot);
        self.next_version
            .fetch_max(handle.version() + 1, Ordering::SeqCst);
        let previous = self.current.swap(Arc::clone(&handle));
        if previous.version() > 0 {
            retired.push_back(previous);
        }
        while retired.len() > self.retained {
            retired.pop_front();
        }
        log::info!(
            "Published {} snapshot v{} ({} records)",
            R::KIND,
            handle.version(),
            handle.len()
        );
        Ok(handle)
    }

    /// Republish the most recently superseded snapshot.
    pub fn rollback(&self) -> Result<SnapshotHandle<R>> {
        let mut retired = self.retired.lock();
        let previous = retired
            .pop_back()
            .ok_or(VectorStoreError::NoRetainedSnapshot(R::KIND))?;
        let replaced = self.current.swap(Arc::clone(&previous));
        log::warn!(
            "Rolled back {} snapshot v{} -> v{}",
            R::KIND,
            replaced.version(),
            previous.version()
        );
        Ok(previous)
    }

    #[must_use]
    pub fn retained_versions(&self) -> Vec<u64> {
        self.retired.lock().iter().map(|s| s.version()).collect()
    }

    pub(crate) fn restore(&self, records: Vec<R>, revision: u64) {
        let mut table = self.table.write();
        table.records = records
            .into_iter()
            .map(|record| (record.key().to_string(), Arc::new(record)))
            .collect();
        table.revision = revision;
    }

    pub(crate) fn reserve_versions_above(&self, version: u64) {
        self.next_version.fetch_max(version + 1, Ordering::SeqCst);
    }

    /// Queue a snapshot loaded from disk as a rollback target; call oldest first.
    pub(crate) fn retain(&self, snapshot: Snapshot<R>) {
        let mut retired = self.retired.lock();
        retired.push_back(Arc::new(snapshot));
        while retired.len() > self.retained {
            retired.pop_front();
        }
    }

    /// Install a snapshot loaded from disk without version checks.
    pub(crate) fn install(&self, snapshot: Snapshot<R>) {
        self.reserve_versions_above(snapshot.version());
        self.current.store(Arc::new(snapshot));
    }
}

fn apply_upsert<R: Record>(table: &mut Table<R>, record: R) -> UpsertOutcome {
    let outcome = match table.records.get(record.key()) {
        Some(existing) if existing.as_ref() == &record => return UpsertOutcome::Unchanged,
        Some(_) => UpsertOutcome::Replaced,
        None => UpsertOutcome::Inserted,
    };
    table
        .records
        .insert(record.key().to_string(), Arc::new(record));
    table.revision += 1;
    outcome
}

pub(crate) fn check_finite(vector: &[f32]) -> Result<()> {
    match vector.iter().position(|v| !v.is_finite()) {
        Some(position) => Err(VectorStoreError::NonFiniteComponent { position }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CollectionKind, RoleAnchor};
    use pretty_assertions::assert_eq;

    fn anchor(title: &str, embedding: Vec<f32>) -> RoleAnchor {
        RoleAnchor {
            job_title: title.to_string(),
            category: "Engineering".to_string(),
            priority_tier: "High".to_string(),
            anchor_embedding: embedding,
            definition: serde_json::json!({"summary": title}),
            keywords: vec!["python".to_string()],
        }
    }

    fn collection() -> Collection<RoleAnchor> {
        Collection::new(2, AnnBuildParams::default(), 2)
    }

    #[test]
    fn upsert_replaces_without_merge() {
        let c = collection();
        assert_eq!(c.upsert(anchor("A", vec![1.0, 0.0])).unwrap(), UpsertOutcome::Inserted);

        let mut replacement = anchor("A", vec![0.0, 1.0]);
        replacement.keywords.clear();
        assert_eq!(c.upsert(replacement.clone()).unwrap(), UpsertOutcome::Replaced);
        assert_eq!(c.get("A").unwrap().as_ref(), &replacement);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn non_finite_components_are_rejected() {
        let c = collection();
        for value in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let err = c.upsert(anchor("A", vec![1.0, value])).unwrap_err();
            assert!(matches!(
                err,
                VectorStoreError::NonFiniteComponent { position: 1 }
            ));
        }
        assert!(c.is_empty());
    }

    #[test]
    fn identical_upsert_is_a_no_op() {
        let c = collection();
        c.upsert(anchor("A", vec![1.0, 0.0])).unwrap();
        let revision = c.revision();
        assert_eq!(
            c.upsert(anchor("A", vec![1.0, 0.0])).unwrap(),
            UpsertOutcome::Unchanged
        );
        assert_eq!(c.revision(), revision);
    }

    #[test]
    fn batch_with_invalid_record_changes_nothing() {
        let c = collection();
        let err = c
            .upsert_batch(vec![anchor("A", vec![1.0, 0.0]), anchor("B", vec![1.0])])
            .unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert!(c.is_empty());
        assert_eq!(c.revision(), 0);
    }

    #[test]
    fn missing_key_is_rejected() {
        let c = collection();
        let err = c.upsert(anchor("  ", vec![1.0, 0.0])).unwrap_err();
        assert!(matches!(err, VectorStoreError::MissingKey(CollectionKind::Anchors)));
    }

    #[test]
    fn ingested_records_wait_for_rebuild() {
        let c = collection();
        c.upsert(anchor("A", vec![1.0, 0.0])).unwrap();

        assert_eq!(c.filter_keys(&SearchFilter::category("Engineering")), vec!["A"]);
        assert!(c.current_snapshot().is_empty());

        let snapshot = c
            .build_snapshot(&AnnBuildParams::default(), &CancelFlag::new())
            .unwrap();
        c.publish(snapshot).unwrap();
        assert_eq!(c.current_snapshot().len(), 1);
    }

    #[test]
    fn old_handle_survives_publish_and_rollback_restores_it() {
        let c = collection();
        c.upsert(anchor("A", vec![1.0, 0.0])).unwrap();
        let params = AnnBuildParams::default();
        c.publish(c.build_snapshot(&params, &CancelFlag::new()).unwrap())
            .unwrap();
        let first = c.current_snapshot();

        c.upsert(anchor("B", vec![0.0, 1.0])).unwrap();
        c.publish(c.build_snapshot(&params, &CancelFlag::new()).unwrap())
            .unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(c.current_snapshot().len(), 2);
        assert_eq!(c.retained_versions(), vec![first.version()]);

        let restored = c.rollback().unwrap();
        assert_eq!(restored.version(), first.version());
        assert_eq!(c.current_snapshot().len(), 1);
        assert!(matches!(
            c.rollback().unwrap_err(),
            VectorStoreError::NoRetainedSnapshot(CollectionKind::Anchors)
        ));
    }

    #[test]
    fn stale_publish_is_refused() {
        let c = collection();
        c.upsert(anchor("A", vec![1.0, 0.0])).unwrap();
        let params = AnnBuildParams::default();
        let older = c.build_snapshot(&params, &CancelFlag::new()).unwrap();
        let newer = c.build_snapshot(&params, &CancelFlag::new()).unwrap();
        c.publish(newer).unwrap();
        assert!(matches!(
            c.publish(older).unwrap_err(),
            VectorStoreError::StaleSnapshot { .. }
        ));
    }

    #[test]
    fn retention_is_bounded() {
        let c = Collection::<RoleAnchor>::new(2, AnnBuildParams::default(), 1);
        c.upsert(anchor("A", vec![1.0, 0.0])).unwrap();
        let params = AnnBuildParams::default();
        for _ in 0..3 {
            c.publish(c.build_snapshot(&params, &CancelFlag::new()).unwrap())
                .unwrap();
        }
        assert_eq!(c.retained_versions().len(), 1);
    }
}
