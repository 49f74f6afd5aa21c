use crate::config::ScoreWeights;
use jobmatch_vector_store::JobPosting;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One ranked posting with the component scores that produced its rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub posting: Arc<JobPosting>,
    /// Anchor (`job_title`) the posting was matched through
    pub category: String,
    pub combined_score: f32,
    pub anchor_similarity: f32,
    pub job_similarity: f32,
    /// Share of the anchor's keywords found in the resume text, when text was supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_overlap: Option<f32>,
}

impl MatchResult {
    /// Human-readable reason for the match, built from the stored component scores.
    #[must_use]
    pub fn explanation(&self) -> String {
        let mut text = format!(
            "matched because of category {} at {:.2}, job at {:.2}",
            self.category, self.anchor_similarity, self.job_similarity
        );
        if let Some(overlap) = self.keyword_overlap {
            text.push_str(&format!(", keywords at {overlap:.2}"));
        }
        text
    }
}

/// A stage-2 hit before scoring.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub posting: Arc<JobPosting>,
    pub category: String,
    pub anchor_similarity: f32,
    pub job_similarity: f32,
    pub keyword_overlap: Option<f32>,
}

/// Descending score, then ascending `job_id`.
pub(crate) fn rank_order(a: &MatchResult, b: &MatchResult) -> Ordering {
    b.combined_score
        .total_cmp(&a.combined_score)
        .then_with(|| a.posting.job_id.cmp(&b.posting.job_id))
}

/// Score, union and rank stage-2 candidates, keeping the best entry per `job_id`.
pub(crate) fn merge(
    candidates: Vec<Candidate>,
    weights: &ScoreWeights,
    global_top: usize,
) -> Vec<MatchResult> {
    let mut best: HashMap<String, MatchResult> = HashMap::with_capacity(candidates.len());
    for candidate in candidates {
        let result = MatchResult {
            combined_score: weights.combine(candidate.anchor_similarity, candidate.job_similarity),
            posting: candidate.posting,
            category: candidate.category,
            anchor_similarity: candidate.anchor_similarity,
            job_similarity: candidate.job_similarity,
            keyword_overlap: candidate.keyword_overlap,
        };
        match best.get(&result.posting.job_id) {
            Some(existing) if rank_order(existing, &result) != Ordering::Greater => {}
            _ => {
                best.insert(result.posting.job_id.clone(), result);
            }
        }
    }

    let mut results: Vec<MatchResult> = best.into_values().collect();
    results.sort_by(rank_order);
    results.truncate(global_top);
    results
}

/// Drops postings whose `(title, metadata[field])` signature was already seen in this category.
pub(crate) struct Deduper<'a> {
    field: Option<&'a str>,
    seen: HashSet<(String, String, String)>,
}

impl<'a> Deduper<'a> {
    pub(crate) fn new(field: Option<&'a str>) -> Self {
        Self {
            field,
            seen: HashSet::new(),
        }
    }

    /// True the first time a signature is offered for `category`.
    pub(crate) fn admit(&mut self, category: &str, posting: &JobPosting) -> bool {
        let Some(field) = self.field else {
            return true;
        };
        let value = match posting.metadata.get(field) {
            Some(serde_json::Value::String(s)) => s.trim().to_lowercase(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        self.seen.insert((
            category.to_string(),
            posting.title.trim().to_lowercase(),
            value,
        ))
    }
}
