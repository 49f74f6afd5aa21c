use crate::error::{Result, SearchError};
use serde::{Deserialize, Serialize};

/// Blend of the two component similarities in the combined score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Weight of the category anchor's similarity (w1)
    pub anchor: f32,
    /// Weight of the posting's own similarity (w2)
    pub job: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            anchor: 0.5,
            job: 0.5,
        }
    }
}

impl ScoreWeights {
    #[must_use]
    pub fn combine(&self, anchor_similarity: f32, job_similarity: f32) -> f32 {
        self.anchor.mul_add(anchor_similarity, self.job * job_similarity)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.anchor.is_finite() || !self.job.is_finite() {
            return Err(SearchError::InvalidRequest("score weights must be finite".into()));
        }
        if self.anchor < 0.0 || self.job < 0.0 {
            return Err(SearchError::InvalidRequest(
                "score weights must not be negative".into(),
            ));
        }
        if self.anchor + self.job <= 0.0 {
            return Err(SearchError::InvalidRequest(
                "score weights must not both be zero".into(),
            ));
        }
        Ok(())
    }
}

/// Where stage 2 looks for postings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage2Mode {
    /// Only postings whose category is one of the stage-1 anchors
    #[default]
    Restricted,
    /// Postings from the whole collection, scored against their own category anchor
    Unrestricted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Categories kept from stage 1 (C)
    pub top_categories: usize,

    /// Postings fetched per category in stage 2 (N)
    pub top_jobs_per_category: usize,

    /// Results returned after the merge (M)
    pub global_top: usize,

    pub score_weights: ScoreWeights,

    pub stage2_mode: Stage2Mode,

    /// Postings below this job similarity are dropped before the merge
    pub min_job_similarity: f32,

    /// Metadata field combined with the title to spot re-posted jobs within a category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedupe_metadata_field: Option<String>,

    /// Share of the stage-1 ranking taken by keyword overlap with the resume text
    pub keyword_weight: f32,

    /// Anchors considered by stage 1 before keyword re-ranking
    pub stage1_pool: usize,

    pub search_timeout_ms: u64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            top_categories: 3,
            top_jobs_per_category: 5,
            global_top: 10,
            score_weights: ScoreWeights::default(),
            stage2_mode: Stage2Mode::Restricted,
            min_job_similarity: 0.0,
            dedupe_metadata_field: None,
            keyword_weight: 0.0,
            stage1_pool: 15,
            search_timeout_ms: 5_000,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_categories == 0 || self.top_jobs_per_category == 0 || self.global_top == 0 {
            return Err(SearchError::InvalidRequest(
                "top_categories, top_jobs_per_category and global_top must be positive".into(),
            ));
        }
        self.score_weights.validate()?;
        if !(-1.0..=1.0).contains(&self.min_job_similarity) {
            return Err(SearchError::InvalidRequest(format!(
                "min_job_similarity {} outside [-1, 1]",
                self.min_job_similarity
            )));
        }
        if !(0.0..=1.0).contains(&self.keyword_weight) {
            return Err(SearchError::InvalidRequest(format!(
                "keyword_weight {} outside [0, 1]",
                self.keyword_weight
            )));
        }
        if self.search_timeout_ms == 0 {
            return Err(SearchError::InvalidRequest(
                "search_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        MatchConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_weights_and_limits() {
        let config = MatchConfig {
            score_weights: ScoreWeights {
                anchor: -0.1,
                job: 1.0,
            },
            ..MatchConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MatchConfig {
            score_weights: ScoreWeights {
                anchor: 0.0,
                job: 0.0,
            },
            ..MatchConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MatchConfig {
            global_top: 0,
            ..MatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_section_fills_defaults() {
        let config: MatchConfig = serde_json::from_str(
            r#"{"top_categories": 1, "stage2_mode": "unrestricted", "score_weights": {"anchor": 0.7}}"#,
        )
        .unwrap();
        assert_eq!(config.top_categories, 1);
        assert_eq!(config.stage2_mode, Stage2Mode::Unrestricted);
        assert!((config.score_weights.job - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.global_top, 10);
    }
}
