use crate::error::{DriftError, Result};
use jobmatch_vector_store::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;

pub const DRIFT_SCHEMA_VERSION: u32 = 1;

/// Per-category summary of one ingestion cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftRecord {
    pub category: String,
    pub ingestion_month: String,
    pub posting_count: usize,
    pub centroid: Vec<f32>,
    /// Mean cosine distance of the cycle's postings to `centroid`
    pub dispersion: f32,
    /// Share of postings mentioning each skill term
    pub skill_frequencies: BTreeMap<String, f32>,
    pub recorded_at_unix_ms: u64,
}

impl DriftRecord {
    pub fn new(
        category: impl Into<String>,
        ingestion_month: impl Into<String>,
        posting_count: usize,
        centroid: Vec<f32>,
        dispersion: f32,
        skill_frequencies: BTreeMap<String, f32>,
    ) -> Self {
        Self {
            category: category.into(),
            ingestion_month: ingestion_month.into(),
            posting_count,
            centroid,
            dispersion,
            skill_frequencies,
            recorded_at_unix_ms: current_unix_ms(),
        }
    }
}

/// Append-only drift records keyed by `(category, ingestion_month)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriftHistory {
    records: BTreeMap<String, BTreeMap<String, DriftRecord>>,
}

#[derive(Serialize)]
struct PersistedHistoryRef<'a> {
    schema_version: u32,
    records: Vec<&'a DriftRecord>,
}

#[derive(Deserialize)]
struct PersistedHistory {
    schema_version: u32,
    #[serde(default)]
    records: Vec<DriftRecord>,
}

impl DriftHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record; an existing `(category, month)` entry is never replaced.
    pub fn append(&mut self, record: DriftRecord) -> Result<()> {
        let months = self.records.entry(record.category.clone()).or_default();
        if months.contains_key(&record.ingestion_month) {
            return Err(DriftError::DuplicateRecord {
                category: record.category,
                month: record.ingestion_month,
            });
        }
        months.insert(record.ingestion_month.clone(), record);
        Ok(())
    }

    pub fn contains(&self, category: &str, month: &str) -> bool {
        self.get(category, month).is_some()
    }

    pub fn get(&self, category: &str, month: &str) -> Option<&DriftRecord> {
        self.records.get(category).and_then(|months| months.get(month))
    }

    /// Records for `category` in ascending month order.
    pub fn records_for(&self, category: &str) -> Vec<&DriftRecord> {
        self.records
            .get(category)
            .map(|months| months.values().collect())
            .unwrap_or_default()
    }

    /// Latest record for `category` strictly before `month`.
    pub fn previous(&self, category: &str, month: &str) -> Option<&DriftRecord> {
        self.records
            .get(category)?
            .range::<str, _>((Bound::Unbounded, Bound::Excluded(month)))
            .next_back()
            .map(|(_, record)| record)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Categories with a record for `month`.
    pub fn categories_in(&self, month: &str) -> Vec<&str> {
        self.records
            .iter()
            .filter(|(_, months)| months.contains_key(month))
            .map(|(category, _)| category.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(err) => return Err(err.into()),
        };
        let persisted: PersistedHistory = serde_json::from_slice(&bytes)?;
        if persisted.schema_version != DRIFT_SCHEMA_VERSION {
            return Err(DriftError::UnsupportedSchema {
                found: persisted.schema_version,
                expected: DRIFT_SCHEMA_VERSION,
            });
        }
        let mut history = Self::new();
        for record in persisted.records {
            history.append(record)?;
        }
        Ok(history)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let persisted = PersistedHistoryRef {
            schema_version: DRIFT_SCHEMA_VERSION,
            records: self.records.values().flat_map(BTreeMap::values).collect(),
        };
        let bytes = serde_json::to_vec_pretty(&persisted)?;
        write_atomic(path, &bytes).await?;
        Ok(())
    }
}

fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|dur| u64::try_from(dur.as_millis()).ok())
        .unwrap_or(0)
}
