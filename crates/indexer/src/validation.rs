use jobmatch_vector_store::{CollectionKind, JobPosting, RoleAnchor, VectorStoreError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role anchor as delivered by an upstream collaborator, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorInput {
    pub job_title: String,
    pub category: String,
    pub priority_tier: String,
    #[serde(alias = "embedding")]
    pub anchor_embedding: Vec<f32>,
    #[serde(alias = "definition_blob")]
    pub definition: serde_json::Value,
    pub keywords: Vec<String>,
}

/// Job posting as delivered by an upstream collaborator, before validation.
///
/// `ingestion_month` is optional; when present it must agree with the batch partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostingInput {
    pub job_id: String,
    pub title: String,
    pub category: String,
    pub location: String,
    #[serde(alias = "embedding")]
    pub description_embedding: Vec<f32>,
    pub metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion_month: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationReason {
    MissingKey,
    DimensionMismatch { expected: usize, actual: usize },
    NonFiniteComponent { position: usize },
    PartitionConflict { batch: String, record: String },
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey => f.write_str("missing key"),
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "dimension mismatch: expected {expected}, got {actual}")
            }
            Self::NonFiniteComponent { position } => {
                write!(f, "non-finite embedding component at {position}")
            }
            Self::PartitionConflict { batch, record } => {
                write!(f, "record partition {record} conflicts with batch partition {batch}")
            }
        }
    }
}

/// A malformed batch record; it is skipped and the rest of the batch continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub collection: CollectionKind,
    /// Position of the record in the submitted batch
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub reason: ValidationReason,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(
                f,
                "{} record #{} ({key}): {}",
                self.collection, self.index, self.reason
            ),
            None => write!(f, "{} record #{}: {}", self.collection, self.index, self.reason),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    /// Map a store rejection onto a per-record validation failure, if it is one.
    pub(crate) fn from_store(
        collection: CollectionKind,
        index: usize,
        key: &str,
        err: &VectorStoreError,
    ) -> Option<Self> {
        let reason = match err {
            VectorStoreError::MissingKey(_) => ValidationReason::MissingKey,
            VectorStoreError::DimensionMismatch { expected, actual } => {
                ValidationReason::DimensionMismatch {
                    expected: *expected,
                    actual: *actual,
                }
            }
            VectorStoreError::NonFiniteComponent { position } => {
                ValidationReason::NonFiniteComponent {
                    position: *position,
                }
            }
            _ => return None,
        };
        Some(Self {
            collection,
            index,
            key: non_blank(key),
            reason,
        })
    }
}

fn non_blank(key: &str) -> Option<String> {
    let key = key.trim();
    (!key.is_empty()).then(|| key.to_string())
}

fn check_key(key: &str) -> Result<(), ValidationReason> {
    if key.trim().is_empty() {
        return Err(ValidationReason::MissingKey);
    }
    Ok(())
}

fn check_embedding(embedding: &[f32], dimension: usize) -> Result<(), ValidationReason> {
    if embedding.len() != dimension {
        return Err(ValidationReason::DimensionMismatch {
            expected: dimension,
            actual: embedding.len(),
        });
    }
    if let Some(position) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(ValidationReason::NonFiniteComponent { position });
    }
    Ok(())
}

impl AnchorInput {
    pub fn validate(self, index: usize, dimension: usize) -> Result<RoleAnchor, ValidationError> {
        let checked = check_key(&self.job_title)
            .and_then(|()| check_embedding(&self.anchor_embedding, dimension));
        if let Err(reason) = checked {
            return Err(ValidationError {
                collection: CollectionKind::Anchors,
                index,
                key: non_blank(&self.job_title),
                reason,
            });
        }
        Ok(RoleAnchor {
            job_title: self.job_title.trim().to_string(),
            category: self.category,
            priority_tier: self.priority_tier,
            anchor_embedding: self.anchor_embedding,
            definition: self.definition,
            keywords: self.keywords,
        })
    }
}

impl PostingInput {
    pub fn validate(
        self,
        index: usize,
        dimension: usize,
        month: &str,
    ) -> Result<JobPosting, ValidationError> {
        let checked = check_key(&self.job_id)
            .and_then(|()| check_embedding(&self.description_embedding, dimension))
            .and_then(|()| match self.ingestion_month.as_deref().map(str::trim) {
                Some(record) if !record.is_empty() && record != month => {
                    Err(ValidationReason::PartitionConflict {
                        batch: month.to_string(),
                        record: record.to_string(),
                    })
                }
                _ => Ok(()),
            });
        if let Err(reason) = checked {
            return Err(ValidationError {
                collection: CollectionKind::Postings,
                index,
                key: non_blank(&self.job_id),
                reason,
            });
        }
        Ok(JobPosting {
            job_id: self.job_id.trim().to_string(),
            title: self.title,
            category: self.category,
            location: self.location,
            description_embedding: self.description_embedding,
            metadata: self.metadata,
            ingestion_month: month.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn posting_input_deserializes_with_embedding_alias() {
        let input: PostingInput = serde_json::from_str(
            r#"{"job_id":"j1","category":"Data Engineer","embedding":[1.0,0.0]}"#,
        )
        .unwrap();
        let posting = input.validate(0, 2, "2026-01").unwrap();
        assert_eq!(posting.description_embedding, vec![1.0, 0.0]);
        assert_eq!(posting.ingestion_month, "2026-01");
    }

    #[test]
    fn missing_key_and_bad_dimension_are_reported() {
        let err = PostingInput {
            description_embedding: vec![1.0, 0.0],
            ..PostingInput::default()
        }
        .validate(3, 2, "2026-01")
        .unwrap_err();
        assert_eq!(err.reason, ValidationReason::MissingKey);
        assert_eq!(err.index, 3);
        assert_eq!(err.key, None);

        let err = AnchorInput {
            job_title: "Data Engineer".to_string(),
            anchor_embedding: vec![1.0],
            ..AnchorInput::default()
        }
        .validate(0, 2)
        .unwrap_err();
        assert_eq!(
            err.reason,
            ValidationReason::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        );
        assert_eq!(err.key.as_deref(), Some("Data Engineer"));
    }

    #[test]
    fn nan_components_are_rejected() {
        let err = AnchorInput {
            job_title: "A".to_string(),
            anchor_embedding: vec![0.5, f32::NAN],
            ..AnchorInput::default()
        }
        .validate(0, 2)
        .unwrap_err();
        assert_eq!(err.reason, ValidationReason::NonFiniteComponent { position: 1 });
    }

    #[test]
    fn conflicting_partition_is_rejected() {
        let err = PostingInput {
            job_id: "j1".to_string(),
            description_embedding: vec![1.0, 0.0],
            ingestion_month: Some("2025-12".to_string()),
            ..PostingInput::default()
        }
        .validate(0, 2, "2026-01")
        .unwrap_err();
        assert!(matches!(err.reason, ValidationReason::PartitionConflict { .. }));
        assert_eq!(
            err.to_string(),
            "postings record #0 (j1): record partition 2025-12 conflicts with batch partition 2026-01"
        );
    }
}
