use crate::cancel::CancelFlag;
use crate::collection::check_finite;
use crate::config::AnnBuildParams;
use crate::embeddings::normalized;
use crate::error::{Result, VectorStoreError};
use crate::hnsw_index::{exact_scan, HnswIndex, Scored};
use crate::types::{CollectionKind, FilterField, Record, SearchFilter, SearchHit};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Reference-counted handle to a published snapshot.
///
/// Holding a handle keeps the snapshot fully queryable even after a newer one is published.
pub type SnapshotHandle<R> = Arc<Snapshot<R>>;

/// Immutable, versioned view of one collection plus its ANN graph.
#[derive(Debug)]
pub struct Snapshot<R: Record> {
    version: u64,
    built_at_unix_ms: u64,
    source_revision: u64,
    dimension: usize,
    params: AnnBuildParams,
    /// Sorted by ascending natural key; the ordinal doubles as the tie-breaker.
    records: Vec<Arc<R>>,
    vectors: Vec<Vec<f32>>,
    filter_postings: HashMap<(FilterField, String), Vec<u32>>,
    index: HnswIndex,
}

impl<R: Record> Snapshot<R> {
    /// Snapshot with no records, used before the first rebuild is published.
    #[must_use]
    pub fn empty(dimension: usize, params: AnnBuildParams) -> Self {
        Self {
            version: 0,
            built_at_unix_ms: 0,
            source_revision: 0,
            dimension,
            params,
            records: Vec::new(),
            vectors: Vec::new(),
            filter_postings: HashMap::new(),
            index: HnswIndex::default(),
        }
    }

    /// Build a new snapshot from a consistent view of the collection's records.
    pub fn build(
        version: u64,
        source_revision: u64,
        dimension: usize,
        mut records: Vec<Arc<R>>,
        params: &AnnBuildParams,
        cancel: &CancelFlag,
    ) -> Result<Self> {
        records.sort_by(|a, b| a.key().cmp(b.key()));
        let vectors = normalized_vectors(&records, dimension)?;
        let index = HnswIndex::build(&vectors, params, cancel)?;
        Ok(Self {
            version,
            built_at_unix_ms: current_unix_ms(),
            source_revision,
            dimension,
            params: params.clone(),
            filter_postings: build_filter_postings(&records),
            records,
            vectors,
            index,
        })
    }

    /// Reassemble a snapshot from persisted parts, verifying the graph against the records.
    pub(crate) fn from_parts(
        version: u64,
        built_at_unix_ms: u64,
        source_revision: u64,
        dimension: usize,
        params: AnnBuildParams,
        records: Vec<R>,
        index: HnswIndex,
    ) -> Result<Self> {
        let records: Vec<Arc<R>> = records.into_iter().map(Arc::new).collect();
        if records.windows(2).any(|pair| pair[0].key() >= pair[1].key()) {
            return Err(VectorStoreError::Corrupt(format!(
                "{} snapshot v{version} records are not in key order",
                R::KIND
            )));
        }
        let vectors = normalized_vectors(&records, dimension)?;
        index.validate(records.len())?;
        Ok(Self {
            version,
            built_at_unix_ms,
            source_revision,
            dimension,
            params,
            filter_postings: build_filter_postings(&records),
            records,
            vectors,
            index,
        })
    }

    #[must_use]
    pub const fn kind(&self) -> CollectionKind {
        R::KIND
    }

    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub const fn built_at_unix_ms(&self) -> u64 {
        self.built_at_unix_ms
    }

    /// Metadata-table revision this snapshot was built from.
    #[must_use]
    pub const fn source_revision(&self) -> u64 {
        self.source_revision
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub const fn params(&self) -> &AnnBuildParams {
        &self.params
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[Arc<R>] {
        &self.records
    }

    #[must_use]
    pub const fn index(&self) -> &HnswIndex {
        &self.index
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Arc<R>> {
        self.records
            .binary_search_by(|record| record.key().cmp(key))
            .ok()
            .map(|ordinal| &self.records[ordinal])
    }

    /// Top-`k` records by cosine similarity, optionally restricted by an equality filter.
    ///
    /// Ties are broken by ascending natural key.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit<R>>> {
        if query.len() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        check_finite(query)?;
        if self.records.is_empty() {
            return Err(VectorStoreError::EmptyCollection(R::KIND));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = normalized(query);
        let scored = match filter.filter(|f| !f.is_empty()) {
            None => self.search_unfiltered(&query, k),
            Some(filter) => self.search_filtered(&query, k, filter),
        };

        Ok(scored
            .into_iter()
            .map(|hit| SearchHit {
                record: Arc::clone(&self.records[hit.node as usize]),
                similarity: hit.similarity,
            })
            .collect())
    }

    fn search_unfiltered(&self, query: &[f32], k: usize) -> Vec<Scored> {
        if self.records.len() <= self.params.exact_scan_below {
            return exact_scan(&self.vectors, query, 0..self.records.len() as u32, k);
        }
        let ef = self.params.ef_search.max(k);
        self.index.search(&self.vectors, query, k, ef, |_| true)
    }

    fn search_filtered(&self, query: &[f32], k: usize, filter: &SearchFilter) -> Vec<Scored> {
        let allowed = self.matching_ordinals(filter);
        if allowed.is_empty() {
            return Vec::new();
        }

        let exact_limit = self.params.exact_scan_below.max(k.saturating_mul(4));
        if allowed.len() <= exact_limit {
            return exact_scan(&self.vectors, query, allowed.iter().copied(), k);
        }

        let ef = self.params.ef_search.max(k).saturating_mul(4);
        let hits = self.index.search(&self.vectors, query, k, ef, |node| {
            allowed.binary_search(&node).is_ok()
        });
        if hits.len() >= k {
            return hits;
        }
        log::debug!(
            "{} filtered ANN returned {} of {k}; falling back to exact scan over {} rows",
            R::KIND,
            hits.len(),
            allowed.len()
        );
        exact_scan(&self.vectors, query, allowed.iter().copied(), k)
    }

    /// Ascending ordinals satisfying every clause of `filter`.
    fn matching_ordinals(&self, filter: &SearchFilter) -> Vec<u32> {
        let mut lists: Vec<&[u32]> = Vec::with_capacity(filter.clauses.len());
        for (field, value) in &filter.clauses {
            match self.filter_postings.get(&(*field, value.clone())) {
                Some(list) => lists.push(list),
                None => return Vec::new(),
            }
        }
        lists.sort_by_key(|list| list.len());
        let Some((first, rest)) = lists.split_first() else {
            return Vec::new();
        };
        first
            .iter()
            .copied()
            .filter(|node| rest.iter().all(|list| list.binary_search(node).is_ok()))
            .collect()
    }
}

/// Search a snapshot; see [`Snapshot::search`].
pub fn search<R: Record>(
    snapshot: &Snapshot<R>,
    query: &[f32],
    k: usize,
    filter: Option<&SearchFilter>,
) -> Result<Vec<SearchHit<R>>> {
    snapshot.search(query, k, filter)
}

fn normalized_vectors<R: Record>(records: &[Arc<R>], dimension: usize) -> Result<Vec<Vec<f32>>> {
    records
        .iter()
        .map(|record| {
            let embedding = record.embedding();
            if embedding.len() != dimension {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: dimension,
                    actual: embedding.len(),
                });
            }
            Ok(normalized(embedding))
        })
        .collect()
}

fn build_filter_postings<R: Record>(records: &[Arc<R>]) -> HashMap<(FilterField, String), Vec<u32>> {
    let mut postings: HashMap<(FilterField, String), Vec<u32>> = HashMap::new();
    for (ordinal, record) in records.iter().enumerate() {
        for field in FilterField::ALL {
            if let Some(value) = record.filter_value(field) {
                postings
                    .entry((field, value.to_string()))
                    .or_default()
                    .push(ordinal as u32);
            }
        }
    }
    postings
}

pub(crate) fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|dur| u64::try_from(dur.as_millis()).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobPosting;
    use pretty_assertions::assert_eq;

    fn posting(id: &str, category: &str, embedding: Vec<f32>) -> Arc<JobPosting> {
        Arc::new(JobPosting {
            job_id: id.to_string(),
            title: format!("title {id}"),
            category: category.to_string(),
            location: "Remote".to_string(),
            description_embedding: embedding,
            metadata: serde_json::Value::Null,
            ingestion_month: "2026-01".to_string(),
        })
    }

    fn build(records: Vec<Arc<JobPosting>>) -> Snapshot<JobPosting> {
        Snapshot::build(1, 1, 3, records, &AnnBuildParams::default(), &CancelFlag::new()).unwrap()
    }

    #[test]
    fn ties_break_by_ascending_key() {
        let snapshot = build(vec![
            posting("j3", "a", vec![1.0, 0.0, 0.0]),
            posting("j1", "a", vec![2.0, 0.0, 0.0]),
            posting("j2", "a", vec![1.0, 0.0, 0.0]),
        ]);
        let hits = snapshot.search(&[1.0, 0.0, 0.0], 3, None).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.record.job_id.as_str()).collect();
        assert_eq!(ids, vec!["j1", "j2", "j3"]);
    }

    #[test]
    fn filter_restricts_results() {
        let snapshot = build(vec![
            posting("j1", "Data Engineer", vec![1.0, 0.0, 0.0]),
            posting("j2", "Backend Engineer", vec![0.9, 0.1, 0.0]),
            posting("j3", "Data Engineer", vec![0.0, 1.0, 0.0]),
        ]);
        let filter = SearchFilter::category("Backend Engineer");
        let hits = snapshot.search(&[1.0, 0.0, 0.0], 5, Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.job_id, "j2");

        let missing = SearchFilter::category("Nope");
        assert!(snapshot.search(&[1.0, 0.0, 0.0], 5, Some(&missing)).unwrap().is_empty());
    }

    #[test]
    fn conjunctive_filter_intersects_fields() {
        let snapshot = build(vec![
            posting("j1", "Data Engineer", vec![1.0, 0.0, 0.0]),
            posting("j2", "Data Engineer", vec![0.9, 0.1, 0.0]),
        ]);
        let filter = SearchFilter::category("Data Engineer")
            .eq(FilterField::Location, "Remote")
            .eq(FilterField::Partition, "2026-01");
        assert_eq!(snapshot.search(&[1.0, 0.0, 0.0], 5, Some(&filter)).unwrap().len(), 2);

        let filter = filter.eq(FilterField::Location, "Berlin");
        assert!(snapshot.search(&[1.0, 0.0, 0.0], 5, Some(&filter)).unwrap().is_empty());
    }

    #[test]
    fn empty_snapshot_reports_empty_collection() {
        let snapshot: Snapshot<JobPosting> = Snapshot::empty(3, AnnBuildParams::default());
        let err = snapshot.search(&[1.0, 0.0, 0.0], 1, None).unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::EmptyCollection(CollectionKind::Postings)
        ));
    }

    #[test]
    fn query_dimension_is_checked() {
        let snapshot = build(vec![posting("j1", "a", vec![1.0, 0.0, 0.0])]);
        let err = snapshot.search(&[1.0, 0.0], 1, None).unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn lookup_by_key() {
        let snapshot = build(vec![
            posting("b", "x", vec![1.0, 0.0, 0.0]),
            posting("a", "x", vec![0.0, 1.0, 0.0]),
        ]);
        assert_eq!(snapshot.get("a").map(|r| r.job_id.as_str()), Some("a"));
        assert!(snapshot.get("c").is_none());
    }
}
