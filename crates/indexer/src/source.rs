use crate::validation::{AnchorInput, PostingInput};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One document from an upstream collaborator, before embedding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceDocument {
    /// Natural key: `job_title` for anchors, `job_id` for postings
    pub key: String,
    /// Text handed to the embedder
    pub text: String,
    pub title: String,
    pub category: String,
    pub location: String,
    pub priority_tier: String,
    pub keywords: Vec<String>,
    pub metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
}

impl SourceDocument {
    pub(crate) fn into_anchor(self, embedding: Vec<f32>) -> AnchorInput {
        AnchorInput {
            job_title: self.key,
            category: self.category,
            priority_tier: self.priority_tier,
            anchor_embedding: embedding,
            definition: self.metadata,
            keywords: self.keywords,
        }
    }

    pub(crate) fn into_posting(self, embedding: Vec<f32>) -> PostingInput {
        PostingInput {
            job_id: self.key,
            title: self.title,
            category: self.category,
            location: self.location,
            description_embedding: embedding,
            metadata: self.metadata,
            ingestion_month: self.partition,
        }
    }
}

/// Anything that yields documents in batches: fetchers, resume parsers, labelers.
///
/// Ingestion consumes every source the same way and never inspects which kind it is.
#[async_trait]
pub trait DocumentSource: Send {
    fn name(&self) -> &str;

    /// Up to `max` documents; an empty batch means the source is exhausted.
    async fn next_batch(&mut self, max: usize) -> Result<Vec<SourceDocument>>;
}

/// In-memory source over a fixed list of documents.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    name: String,
    documents: VecDeque<SourceDocument>,
}

impl VecSource {
    pub fn new(name: impl Into<String>, documents: Vec<SourceDocument>) -> Self {
        Self {
            name: name.into(),
            documents: documents.into(),
        }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.documents.len()
    }
}

#[async_trait]
impl DocumentSource for VecSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_batch(&mut self, max: usize) -> Result<Vec<SourceDocument>> {
        let take = max.max(1).min(self.documents.len());
        Ok(self.documents.drain(..take).collect())
    }
}
