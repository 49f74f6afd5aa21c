use crate::config::{MatchConfig, Stage2Mode};
use crate::error::{Result, SearchError};
use crate::keywords::keyword_overlap;
use crate::merge::{merge, Candidate, Deduper, MatchResult};
use jobmatch_vector_store::{
    cosine_similarity, CollectionKind, EmbeddingStore, JobPosting, RoleAnchor, SearchFilter,
    SearchHit, Snapshot, VectorStoreError,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Extra postings fetched per category when thresholding or de-duplication may drop some.
const OVERFETCH_FACTOR: usize = 2;

/// Query for one match call. Unset limits fall back to the matcher's [`MatchConfig`].
#[derive(Debug, Clone, Default)]
pub struct MatchRequest {
    pub resume_embedding: Vec<f32>,
    pub resume_text: Option<String>,
    pub top_categories: Option<usize>,
    pub top_jobs_per_category: Option<usize>,
    pub global_top: Option<usize>,
    pub stage2_mode: Option<Stage2Mode>,
}

impl MatchRequest {
    #[must_use]
    pub fn new(resume_embedding: Vec<f32>) -> Self {
        Self {
            resume_embedding,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_resume_text(mut self, text: impl Into<String>) -> Self {
        self.resume_text = Some(text.into());
        self
    }

    #[must_use]
    pub const fn with_limits(
        mut self,
        top_categories: usize,
        top_jobs_per_category: usize,
        global_top: usize,
    ) -> Self {
        self.top_categories = Some(top_categories);
        self.top_jobs_per_category = Some(top_jobs_per_category);
        self.global_top = Some(global_top);
        self
    }

    #[must_use]
    pub const fn with_stage2_mode(mut self, mode: Stage2Mode) -> Self {
        self.stage2_mode = Some(mode);
        self
    }
}

/// A stage-1 category and how it ranked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryMatch {
    pub job_title: String,
    pub similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_overlap: Option<f32>,
    /// Ranking score after keyword blending; equals `similarity` without resume text
    pub rank_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchReport {
    pub anchor_snapshot_version: u64,
    pub posting_snapshot_version: u64,
    pub stage2_mode: Stage2Mode,
    pub categories: Vec<CategoryMatch>,
    pub results: Vec<MatchResult>,
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    categories: usize,
    jobs_per_category: usize,
    global_top: usize,
    mode: Stage2Mode,
}

/// Two-stage matcher over the store's published snapshots.
pub struct TwoStageMatcher {
    store: Arc<EmbeddingStore>,
    config: MatchConfig,
}

impl TwoStageMatcher {
    pub fn new(store: Arc<EmbeddingStore>, config: MatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    #[must_use]
    pub const fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Ranked postings for `request`.
    pub async fn match_resume(&self, request: MatchRequest) -> Result<Vec<MatchResult>> {
        Ok(self.match_report(request).await?.results)
    }

    /// Full match including the stage-1 categories and the snapshot versions read.
    ///
    /// Both snapshots are pinned when the call starts; a publish during the call does not
    /// affect it. The call fails with [`SearchError::SearchTimeout`] after `search_timeout_ms`.
    pub async fn match_report(&self, request: MatchRequest) -> Result<MatchReport> {
        let anchors = self.store.anchor_snapshot();
        let postings = self.store.posting_snapshot();
        let config = self.config.clone();
        let timeout_ms = config.search_timeout_ms;

        let task = tokio::task::spawn_blocking(move || {
            match_snapshots(&anchors, &postings, &request, &config)
        });
        match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
            Ok(joined) => Ok(joined??),
            Err(_) => {
                log::warn!("Match timed out after {timeout_ms} ms");
                Err(SearchError::SearchTimeout { timeout_ms })
            }
        }
    }
}

/// Run both stages against explicit snapshots.
pub fn match_snapshots(
    anchors: &Snapshot<RoleAnchor>,
    postings: &Snapshot<JobPosting>,
    request: &MatchRequest,
    config: &MatchConfig,
) -> Result<MatchReport> {
    let limits = Limits {
        categories: request.top_categories.unwrap_or(config.top_categories),
        jobs_per_category: request
            .top_jobs_per_category
            .unwrap_or(config.top_jobs_per_category),
        global_top: request.global_top.unwrap_or(config.global_top),
        mode: request.stage2_mode.unwrap_or(config.stage2_mode),
    };
    if limits.categories == 0 || limits.jobs_per_category == 0 || limits.global_top == 0 {
        return Err(SearchError::InvalidRequest(
            "match limits must be positive".into(),
        ));
    }

    let query = request.resume_embedding.as_slice();
    let resume_text = request.resume_text.as_deref();
    let categories = stage_one(anchors, query, resume_text, config, limits.categories)?;

    let candidates = match limits.mode {
        Stage2Mode::Restricted => {
            stage_two_restricted(postings, query, &categories, config, limits)?
        }
        Stage2Mode::Unrestricted => {
            stage_two_unrestricted(anchors, postings, query, resume_text, config, limits)?
        }
    };
    let results = merge(candidates, &config.score_weights, limits.global_top);

    log::debug!(
        "Matched {} postings across {} categories (anchors v{}, postings v{})",
        results.len(),
        categories.len(),
        anchors.version(),
        postings.version()
    );
    Ok(MatchReport {
        anchor_snapshot_version: anchors.version(),
        posting_snapshot_version: postings.version(),
        stage2_mode: limits.mode,
        categories,
        results,
    })
}

/// Top categories for the query. An empty anchor snapshot is an error.
fn stage_one(
    anchors: &Snapshot<RoleAnchor>,
    query: &[f32],
    resume_text: Option<&str>,
    config: &MatchConfig,
    top_categories: usize,
) -> Result<Vec<CategoryMatch>> {
    let blend = resume_text.is_some() && config.keyword_weight > 0.0;
    let pool = if blend {
        top_categories.max(config.stage1_pool)
    } else {
        top_categories
    };

    let mut ranked: Vec<CategoryMatch> = anchors
        .search(query, pool, None)?
        .into_iter()
        .map(|hit| {
            let overlap = resume_text.map(|text| keyword_overlap(text, &hit.record.keywords));
            let rank_score = match overlap {
                Some(overlap) if blend => (1.0 - config.keyword_weight)
                    .mul_add(hit.similarity, config.keyword_weight * overlap),
                _ => hit.similarity,
            };
            CategoryMatch {
                job_title: hit.record.job_title.clone(),
                similarity: hit.similarity,
                keyword_overlap: overlap,
                rank_score,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.rank_score
            .total_cmp(&a.rank_score)
            .then_with(|| a.job_title.cmp(&b.job_title))
    });
    ranked.truncate(top_categories);
    if ranked.is_empty() {
        return Err(SearchError::EmptyCollection(CollectionKind::Anchors));
    }
    Ok(ranked)
}

fn stage_two_restricted(
    postings: &Snapshot<JobPosting>,
    query: &[f32],
    categories: &[CategoryMatch],
    config: &MatchConfig,
    limits: Limits,
) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::new();
    for category in categories {
        let filter = SearchFilter::category(category.job_title.clone());
        let hits = admitted_hits(postings, query, Some(&filter), limits.jobs_per_category, config);
        let hits = match hits {
            Ok(hits) => hits,
            Err(VectorStoreError::EmptyCollection(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        candidates.extend(hits.into_iter().map(|hit| Candidate {
            posting: hit.record,
            category: category.job_title.clone(),
            anchor_similarity: category.similarity,
            job_similarity: hit.similarity,
            keyword_overlap: category.keyword_overlap,
        }));
    }
    Ok(candidates)
}

/// Search every posting, then score each against its own category's anchor.
fn stage_two_unrestricted(
    anchors: &Snapshot<RoleAnchor>,
    postings: &Snapshot<JobPosting>,
    query: &[f32],
    resume_text: Option<&str>,
    config: &MatchConfig,
    limits: Limits,
) -> Result<Vec<Candidate>> {
    let pool = limits
        .global_top
        .max(limits.categories.saturating_mul(limits.jobs_per_category));
    let hits = match admitted_hits(postings, query, None, pool, config) {
        Ok(hits) => hits,
        Err(VectorStoreError::EmptyCollection(_)) => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut candidates = Vec::with_capacity(hits.len());
    for hit in hits {
        let anchor = anchors.get(&hit.record.category);
        let anchor_similarity = anchor
            .map(|anchor| cosine_similarity(query, &anchor.anchor_embedding))
            .unwrap_or(0.0);
        let overlap = match (anchor, resume_text) {
            (Some(anchor), Some(text)) => Some(keyword_overlap(text, &anchor.keywords)),
            _ => None,
        };
        candidates.push(Candidate {
            category: hit.record.category.clone(),
            posting: hit.record,
            anchor_similarity,
            job_similarity: hit.similarity,
            keyword_overlap: overlap,
        });
    }
    Ok(candidates)
}

/// Best `wanted` hits that clear `min_job_similarity` and survive de-duplication.
///
/// The search is widened until enough hits survive, the pool behind `filter` is exhausted,
/// or the weakest fetched hit already falls below the similarity floor.
fn admitted_hits(
    postings: &Snapshot<JobPosting>,
    query: &[f32],
    filter: Option<&SearchFilter>,
    wanted: usize,
    config: &MatchConfig,
) -> std::result::Result<Vec<SearchHit<JobPosting>>, VectorStoreError> {
    let mut fetch = fetch_size(config, wanted).max(1);
    loop {
        let hits = postings.search(query, fetch, filter)?;
        let exhausted = hits.len() < fetch || fetch >= postings.len();
        let below_floor = hits
            .last()
            .is_some_and(|hit| hit.similarity < config.min_job_similarity);

        let mut deduper = Deduper::new(config.dedupe_metadata_field.as_deref());
        let mut kept = Vec::with_capacity(wanted);
        for hit in hits {
            if kept.len() == wanted {
                break;
            }
            if hit.similarity < config.min_job_similarity
                || !deduper.admit(&hit.record.category, &hit.record)
            {
                continue;
            }
            kept.push(hit);
        }
        if kept.len() == wanted || exhausted || below_floor {
            return Ok(kept);
        }
        fetch = fetch.saturating_mul(OVERFETCH_FACTOR).min(postings.len());
        log::debug!("Widening stage-2 search to {fetch} postings");
    }
}

fn fetch_size(config: &MatchConfig, wanted: usize) -> usize {
    if config.dedupe_metadata_field.is_some() || config.min_job_similarity > -1.0 {
        wanted.saturating_mul(OVERFETCH_FACTOR)
    } else {
        wanted
    }
}
