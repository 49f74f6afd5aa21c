use crate::collection::Collection;
use crate::config::{AnnBuildParams, StoreConfig};
use crate::error::{Result, VectorStoreError};
use crate::hnsw_index::HnswIndex;
use crate::paths::{
    current_pointer_path, parse_snapshot_version, snapshot_dir, snapshot_path, table_path,
};
use crate::snapshot::Snapshot;
use crate::store::EmbeddingStore;
use crate::types::{CollectionKind, Record};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const STORE_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct PersistedTableRef<'a, R> {
    schema_version: u32,
    kind: CollectionKind,
    revision: u64,
    records: &'a [Arc<R>],
}

#[derive(Deserialize)]
struct PersistedTable<R> {
    schema_version: u32,
    kind: CollectionKind,
    revision: u64,
    records: Vec<R>,
}

#[derive(Serialize)]
struct PersistedSnapshotRef<'a, R> {
    schema_version: u32,
    kind: CollectionKind,
    version: u64,
    built_at_unix_ms: u64,
    source_revision: u64,
    dimension: usize,
    params: &'a AnnBuildParams,
    records: &'a [Arc<R>],
    graph: &'a HnswIndex,
}

#[derive(Deserialize)]
struct PersistedSnapshot<R> {
    schema_version: u32,
    kind: CollectionKind,
    version: u64,
    built_at_unix_ms: u64,
    source_revision: u64,
    dimension: usize,
    params: AnnBuildParams,
    records: Vec<R>,
    graph: HnswIndex,
}

/// Write `bytes` next to `path` and rename into place.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Persist both metadata tables.
pub async fn save_tables(store: &EmbeddingStore, data_dir: &Path) -> Result<()> {
    save_table(store.anchors(), data_dir).await?;
    save_table(store.postings(), data_dir).await?;
    log::info!("Saved metadata tables to {}", data_dir.display());
    Ok(())
}

async fn save_table<R: Record>(collection: &Collection<R>, data_dir: &Path) -> Result<()> {
    let view = collection.view();
    let persisted = PersistedTableRef {
        schema_version: STORE_SCHEMA_VERSION,
        kind: R::KIND,
        revision: view.revision,
        records: &view.records,
    };
    let bytes = serde_json::to_vec(&persisted)?;
    write_atomic(&table_path(data_dir, R::KIND), &bytes).await
}

/// Write a snapshot file. The snapshot is not served from disk until [`commit_current`].
pub async fn write_snapshot<R: Record>(data_dir: &Path, snapshot: &Snapshot<R>) -> Result<PathBuf> {
    let persisted = PersistedSnapshotRef {
        schema_version: STORE_SCHEMA_VERSION,
        kind: R::KIND,
        version: snapshot.version(),
        built_at_unix_ms: snapshot.built_at_unix_ms(),
        source_revision: snapshot.source_revision(),
        dimension: snapshot.dimension(),
        params: snapshot.params(),
        records: snapshot.records(),
        graph: snapshot.index(),
    };
    let bytes = serde_json::to_vec(&persisted)?;
    let path = snapshot_path(data_dir, R::KIND, snapshot.version());
    write_atomic(&path, &bytes).await?;
    Ok(path)
}

/// Contents of a collection's `CURRENT` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPointer {
    pub schema_version: u32,
    /// Version served after open
    pub current: u64,
    /// Every committed version whose file was still on disk at the last commit, ascending
    pub committed: Vec<u64>,
}

/// Point `CURRENT` at `version`. This rename is the on-disk publish commit point.
///
/// The pointer also records which versions were ever committed, so snapshot files left
/// behind by an interrupted rebuild never become rollback targets.
pub async fn commit_current(data_dir: &Path, kind: CollectionKind, version: u64) -> Result<()> {
    let on_disk = list_snapshot_versions(data_dir, kind).await?;
    let mut committed: Vec<u64> = read_current_pointer(data_dir, kind)
        .await?
        .map(|pointer| pointer.committed)
        .unwrap_or_default()
        .into_iter()
        .filter(|v| on_disk.binary_search(v).is_ok())
        .collect();
    committed.push(version);
    committed.sort_unstable();
    committed.dedup();

    let pointer = CurrentPointer {
        schema_version: STORE_SCHEMA_VERSION,
        current: version,
        committed,
    };
    let bytes = serde_json::to_vec(&pointer)?;
    write_atomic(&current_pointer_path(data_dir, kind), &bytes).await
}

pub async fn read_current_pointer(
    data_dir: &Path,
    kind: CollectionKind,
) -> Result<Option<CurrentPointer>> {
    let bytes = match tokio::fs::read(current_pointer_path(data_dir, kind)).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let pointer: CurrentPointer = serde_json::from_slice(&bytes)
        .map_err(|err| VectorStoreError::Corrupt(format!("{kind} CURRENT pointer: {err}")))?;
    if pointer.schema_version != STORE_SCHEMA_VERSION {
        return Err(VectorStoreError::Corrupt(format!(
            "Unsupported {kind} CURRENT schema_version {} (expected {STORE_SCHEMA_VERSION})",
            pointer.schema_version
        )));
    }
    Ok(Some(pointer))
}

pub async fn read_current_version(data_dir: &Path, kind: CollectionKind) -> Result<Option<u64>> {
    Ok(read_current_pointer(data_dir, kind)
        .await?
        .map(|pointer| pointer.current))
}

/// Versions of every snapshot file on disk for `kind`, ascending.
pub async fn list_snapshot_versions(data_dir: &Path, kind: CollectionKind) -> Result<Vec<u64>> {
    let dir = snapshot_dir(data_dir, kind);
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut versions = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(version) = entry.file_name().to_str().and_then(parse_snapshot_version) {
            versions.push(version);
        }
    }
    versions.sort_unstable();
    Ok(versions)
}

/// Delete snapshot files for `kind` except the listed versions.
pub async fn prune_snapshots(data_dir: &Path, kind: CollectionKind, keep: &[u64]) -> Result<usize> {
    let mut removed = 0;
    for version in list_snapshot_versions(data_dir, kind).await? {
        if keep.contains(&version) {
            continue;
        }
        match tokio::fs::remove_file(snapshot_path(data_dir, kind, version)).await {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
    if removed > 0 {
        log::debug!("Pruned {removed} superseded {kind} snapshot files");
    }
    Ok(removed)
}

/// Open a store from `data_dir`, restoring tables and the committed snapshots.
///
/// Missing files yield an empty collection; snapshot files not referenced by `CURRENT`
/// (for example left behind by an interrupted rebuild) are ignored.
pub async fn open_store(data_dir: &Path, config: StoreConfig) -> Result<EmbeddingStore> {
    let store = EmbeddingStore::new(config);
    load_collection(store.anchors(), data_dir).await?;
    load_collection(store.postings(), data_dir).await?;
    Ok(store)
}

async fn load_collection<R: Record>(collection: &Collection<R>, data_dir: &Path) -> Result<()> {
    let table_file = table_path(data_dir, R::KIND);
    match tokio::fs::read(&table_file).await {
        Ok(bytes) => {
            let persisted: PersistedTable<R> = serde_json::from_slice(&bytes)?;
            check_header(persisted.schema_version, persisted.kind, R::KIND)?;
            for record in &persisted.records {
                collection.validate(record)?;
            }
            log::info!(
                "Loaded {} {} records (revision {})",
                persisted.records.len(),
                R::KIND,
                persisted.revision
            );
            collection.restore(persisted.records, persisted.revision);
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }

    let on_disk = list_snapshot_versions(data_dir, R::KIND).await?;
    if let Some(latest) = on_disk.last() {
        collection.reserve_versions_above(*latest);
    }

    let Some(pointer) = read_current_pointer(data_dir, R::KIND).await? else {
        return Ok(());
    };
    let version = pointer.current;
    let snapshot = load_snapshot::<R>(data_dir, version, collection.dimension()).await?;
    log::info!(
        "Serving {} snapshot v{version} ({} records)",
        R::KIND,
        snapshot.len()
    );
    collection.install(snapshot);

    // Older committed versions left on disk are the rollback targets.
    let retained_versions = on_disk
        .into_iter()
        .filter(|v| *v < version && pointer.committed.binary_search(v).is_ok());
    for retained in retained_versions {
        match load_snapshot::<R>(data_dir, retained, collection.dimension()).await {
            Ok(snapshot) => collection.retain(snapshot),
            Err(err) => log::warn!("Skipping retained {} snapshot v{retained}: {err}", R::KIND),
        }
    }
    Ok(())
}

pub async fn load_snapshot<R: Record>(
    data_dir: &Path,
    version: u64,
    dimension: usize,
) -> Result<Snapshot<R>> {
    let bytes = tokio::fs::read(snapshot_path(data_dir, R::KIND, version)).await?;
    let persisted: PersistedSnapshot<R> = serde_json::from_slice(&bytes)?;
    check_header(persisted.schema_version, persisted.kind, R::KIND)?;
    if persisted.version != version {
        return Err(VectorStoreError::Corrupt(format!(
            "{} snapshot file v{version} claims v{}",
            R::KIND,
            persisted.version
        )));
    }
    if persisted.dimension != dimension {
        return Err(VectorStoreError::DimensionMismatch {
            expected: dimension,
            actual: persisted.dimension,
        });
    }
    Snapshot::from_parts(
        persisted.version,
        persisted.built_at_unix_ms,
        persisted.source_revision,
        persisted.dimension,
        persisted.params,
        persisted.records,
        persisted.graph,
    )
}

impl EmbeddingStore {
    pub async fn open(data_dir: &Path, config: StoreConfig) -> Result<Self> {
        open_store(data_dir, config).await
    }

    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        save_tables(self, data_dir).await
    }

    /// Current plus retained snapshot versions for `kind`; everything else on disk is prunable.
    #[must_use]
    pub fn live_versions(&self, kind: CollectionKind) -> Vec<u64> {
        let status = self.status(kind);
        let mut versions = status.retained_versions;
        versions.push(status.snapshot_version);
        versions
    }
}

fn check_header(schema_version: u32, found: CollectionKind, expected: CollectionKind) -> Result<()> {
    if schema_version != STORE_SCHEMA_VERSION {
        return Err(VectorStoreError::Corrupt(format!(
            "Unsupported store schema_version {schema_version} (expected {STORE_SCHEMA_VERSION})"
        )));
    }
    if found != expected {
        return Err(VectorStoreError::Corrupt(format!(
            "expected {expected} data, found {found}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelFlag;
    use crate::types::{JobPosting, RoleAnchor};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn anchor(title: &str, embedding: Vec<f32>) -> RoleAnchor {
        RoleAnchor {
            job_title: title.to_string(),
            category: "Engineering".to_string(),
            priority_tier: "High".to_string(),
            anchor_embedding: embedding,
            definition: serde_json::json!({"skills": ["sql"]}),
            keywords: vec!["sql".to_string()],
        }
    }

    #[tokio::test]
    async fn committed_snapshot_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::with_dimension(2);
        let store = EmbeddingStore::new(config.clone());
        store.upsert_anchor(anchor("A", vec![1.0, 0.0])).unwrap();
        store.upsert_anchor(anchor("B", vec![0.0, 1.0])).unwrap();

        let params = config.ann_build_params.clone();
        let snapshot = store
            .anchors()
            .build_snapshot(&params, &CancelFlag::new())
            .unwrap();
        write_snapshot(tmp.path(), &snapshot).await.unwrap();
        commit_current(tmp.path(), CollectionKind::Anchors, snapshot.version())
            .await
            .unwrap();
        store.anchors().publish(snapshot).unwrap();
        save_tables(&store, tmp.path()).await.unwrap();

        let reopened = open_store(tmp.path(), config).await.unwrap();
        assert_eq!(reopened.anchors().len(), 2);
        let served = reopened.anchor_snapshot();
        assert_eq!(served.len(), 2);
        let hits = served.search(&[0.0, 1.0], 1, None).unwrap();
        assert_eq!(hits[0].record.job_title, "B");
        assert!(reopened.posting_snapshot().is_empty());
    }

    #[tokio::test]
    async fn uncommitted_snapshot_is_never_served() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::with_dimension(2);
        let store = EmbeddingStore::new(config.clone());
        store
            .upsert_posting(JobPosting {
                job_id: "j1".to_string(),
                title: "Engineer".to_string(),
                category: "A".to_string(),
                location: String::new(),
                description_embedding: vec![1.0, 0.0],
                metadata: serde_json::Value::Null,
                ingestion_month: "2026-01".to_string(),
            })
            .unwrap();
        let snapshot = store
            .postings()
            .build_snapshot(&config.ann_build_params, &CancelFlag::new())
            .unwrap();
        write_snapshot(tmp.path(), &snapshot).await.unwrap();

        let reopened = open_store(tmp.path(), config).await.unwrap();
        assert!(reopened.posting_snapshot().is_empty());
        assert!(reopened.postings().allocate_version() > snapshot.version());
    }

    #[tokio::test]
    async fn retained_snapshot_is_a_rollback_target_after_reopen() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::with_dimension(2);
        let store = EmbeddingStore::new(config.clone());
        store.upsert_anchor(anchor("A", vec![1.0, 0.0])).unwrap();
        for title in ["B", "C"] {
            let snapshot = store
                .anchors()
                .build_snapshot(&config.ann_build_params, &CancelFlag::new())
                .unwrap();
            write_snapshot(tmp.path(), &snapshot).await.unwrap();
            commit_current(tmp.path(), CollectionKind::Anchors, snapshot.version())
                .await
                .unwrap();
            store.anchors().publish(snapshot).unwrap();
            store.upsert_anchor(anchor(title, vec![0.0, 1.0])).unwrap();
        }
        save_tables(&store, tmp.path()).await.unwrap();

        let reopened = open_store(tmp.path(), config).await.unwrap();
        assert_eq!(reopened.anchor_snapshot().version(), 2);
        assert_eq!(reopened.anchors().retained_versions(), vec![1]);
        let previous = reopened.anchors().rollback().unwrap();
        assert_eq!(previous.version(), 1);
        assert_eq!(previous.len(), 1);
    }

    #[tokio::test]
    async fn interrupted_rebuild_file_is_not_a_rollback_target() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::with_dimension(2);
        let store = EmbeddingStore::new(config.clone());
        store.upsert_anchor(anchor("A", vec![1.0, 0.0])).unwrap();
        for commit in [true, false] {
            let snapshot = store
                .anchors()
                .build_snapshot(&config.ann_build_params, &CancelFlag::new())
                .unwrap();
            write_snapshot(tmp.path(), &snapshot).await.unwrap();
            if commit {
                commit_current(tmp.path(), CollectionKind::Anchors, snapshot.version())
                    .await
                    .unwrap();
                store.anchors().publish(snapshot).unwrap();
            }
        }
        save_tables(&store, tmp.path()).await.unwrap();

        let reopened = open_store(tmp.path(), config.clone()).await.unwrap();
        reopened.upsert_anchor(anchor("B", vec![0.0, 1.0])).unwrap();
        let snapshot = reopened
            .anchors()
            .build_snapshot(&config.ann_build_params, &CancelFlag::new())
            .unwrap();
        assert_eq!(snapshot.version(), 3);
        write_snapshot(tmp.path(), &snapshot).await.unwrap();
        commit_current(tmp.path(), CollectionKind::Anchors, 3)
            .await
            .unwrap();
        save_tables(&reopened, tmp.path()).await.unwrap();

        let pointer = read_current_pointer(tmp.path(), CollectionKind::Anchors)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pointer.current, 3);
        assert_eq!(pointer.committed, vec![1, 3]);

        let again = open_store(tmp.path(), config).await.unwrap();
        assert_eq!(again.anchor_snapshot().version(), 3);
        assert_eq!(again.anchors().retained_versions(), vec![1]);
    }

    #[tokio::test]
    async fn prune_keeps_listed_versions() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::with_dimension(2);
        let store = EmbeddingStore::new(config.clone());
        store.upsert_anchor(anchor("A", vec![1.0, 0.0])).unwrap();
        let mut versions = Vec::new();
        for _ in 0..3 {
            let snapshot = store
                .anchors()
                .build_snapshot(&config.ann_build_params, &CancelFlag::new())
                .unwrap();
            versions.push(snapshot.version());
            write_snapshot(tmp.path(), &snapshot).await.unwrap();
        }

        let removed = prune_snapshots(tmp.path(), CollectionKind::Anchors, &versions[1..])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            list_snapshot_versions(tmp.path(), CollectionKind::Anchors)
                .await
                .unwrap(),
            versions[1..].to_vec()
        );
    }

    #[tokio::test]
    async fn dimension_change_is_rejected_on_open() {
        let tmp = TempDir::new().unwrap();
        let store = EmbeddingStore::new(StoreConfig::with_dimension(2));
        store.upsert_anchor(anchor("A", vec![1.0, 0.0])).unwrap();
        save_tables(&store, tmp.path()).await.unwrap();

        let err = open_store(tmp.path(), StoreConfig::with_dimension(3))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { .. }));
    }
}
