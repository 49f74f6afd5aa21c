use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The two logical collections held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Anchors,
    Postings,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 2] = [CollectionKind::Anchors, CollectionKind::Postings];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anchors => "anchors",
            Self::Postings => "postings",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anchors" | "anchor" | "roles" => Ok(Self::Anchors),
            "postings" | "posting" | "jobs" => Ok(Self::Postings),
            other => Err(format!(
                "unknown collection '{other}' (expected 'anchors' or 'postings')"
            )),
        }
    }
}

/// Scalar attributes that may be used in equality filters.
///
/// Only these fields are indexed; record metadata stays opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    Category,
    Location,
    Partition,
}

impl FilterField {
    pub const ALL: [FilterField; 3] = [
        FilterField::Category,
        FilterField::Location,
        FilterField::Partition,
    ];
}

/// Conjunction of equality constraints over whitelisted fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub clauses: Vec<(FilterField, String)>,
}

impl SearchFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, field: FilterField, value: impl Into<String>) -> Self {
        self.clauses.push((field, value.into()));
        self
    }

    #[must_use]
    pub fn category(value: impl Into<String>) -> Self {
        Self::new().eq(FilterField::Category, value)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches<R: Record>(&self, record: &R) -> bool {
        self.clauses
            .iter()
            .all(|(field, value)| record.filter_value(*field) == Some(value.as_str()))
    }
}

/// A record stored in one of the collections.
///
/// The natural key is the sole identity; upserting an existing key replaces the record.
pub trait Record:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: CollectionKind;

    fn key(&self) -> &str;

    fn embedding(&self) -> &[f32];

    fn filter_value(&self, field: FilterField) -> Option<&str>;
}

/// Canonical role definition, one per job category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAnchor {
    pub job_title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub priority_tier: String,
    pub anchor_embedding: Vec<f32>,
    #[serde(default)]
    pub definition: serde_json::Value,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Record for RoleAnchor {
    const KIND: CollectionKind = CollectionKind::Anchors;

    fn key(&self) -> &str {
        &self.job_title
    }

    fn embedding(&self) -> &[f32] {
        &self.anchor_embedding
    }

    fn filter_value(&self, field: FilterField) -> Option<&str> {
        match field {
            FilterField::Category => Some(self.category.as_str()),
            FilterField::Location | FilterField::Partition => None,
        }
    }
}

/// A scraped job posting, partitioned by ingestion month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub job_id: String,
    #[serde(default)]
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub location: String,
    pub description_embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub ingestion_month: String,
}

impl Record for JobPosting {
    const KIND: CollectionKind = CollectionKind::Postings;

    fn key(&self) -> &str {
        &self.job_id
    }

    fn embedding(&self) -> &[f32] {
        &self.description_embedding
    }

    fn filter_value(&self, field: FilterField) -> Option<&str> {
        match field {
            FilterField::Category => Some(self.category.as_str()),
            FilterField::Location => Some(self.location.as_str()),
            FilterField::Partition => Some(self.ingestion_month.as_str()),
        }
    }
}

/// One nearest-neighbour hit from a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit<R> {
    pub record: Arc<R>,
    pub similarity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    Unchanged,
}
