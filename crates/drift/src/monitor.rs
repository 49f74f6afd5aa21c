use crate::config::DriftConfig;
use crate::distribution::{assess_distribution, DistributionReport};
use crate::error::{DriftError, Result};
use crate::history::{DriftHistory, DriftRecord};
use crate::statistics::{centroid, centroid_shift, dispersion, jensen_shannon};
use crate::vocabulary::{aligned, SkillVocabulary};
use jobmatch_vector_store::paths::drift_history_path;
use jobmatch_vector_store::{JobPosting, Snapshot, VectorStoreError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftMetric {
    CentroidShift,
    Dispersion,
    SkillDistribution,
}

/// A drift value that exceeded its configured threshold. Reported only; never acted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftSignal {
    pub metric: DriftMetric,
    pub value: f32,
    pub threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub category: String,
    pub from_month: String,
    pub to_month: String,
    pub from_postings: usize,
    pub to_postings: usize,
    /// `1 - cos(centroid_from, centroid_to)`
    pub centroid_shift: f32,
    /// `dispersion_to - dispersion_from`
    pub dispersion_delta: f32,
    /// Jensen-Shannon divergence of skill-term frequencies, in bits
    pub skill_divergence: f32,
    pub signals: Vec<DriftSignal>,
}

impl DriftReport {
    pub fn is_flagged(&self) -> bool {
        !self.signals.is_empty()
    }
}

/// Outcome of recording one ingestion cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub ingestion_month: String,
    pub postings: usize,
    pub recorded: Vec<String>,
    /// Categories that already had a record for this month
    pub skipped: Vec<String>,
}

/// Tracks per-category embedding and skill statistics across ingestion cycles.
pub struct DriftMonitor {
    config: DriftConfig,
    vocabulary: SkillVocabulary,
    history: RwLock<DriftHistory>,
    history_path: Option<PathBuf>,
    persist: tokio::sync::Mutex<()>,
}

impl DriftMonitor {
    /// In-memory monitor with empty history.
    pub fn new(config: DriftConfig) -> Result<Self> {
        Self::with_history(config, DriftHistory::new(), None)
    }

    /// Monitor backed by `<data_dir>/drift_history.json`; every recorded cycle is persisted.
    pub async fn open(data_dir: &Path, config: DriftConfig) -> Result<Self> {
        let path = drift_history_path(data_dir);
        let history = DriftHistory::load(&path).await?;
        log::debug!(
            "Loaded {} drift record(s) from {}",
            history.len(),
            path.display()
        );
        Self::with_history(config, history, Some(path))
    }

    fn with_history(
        config: DriftConfig,
        history: DriftHistory,
        history_path: Option<PathBuf>,
    ) -> Result<Self> {
        config.validate()?;
        let vocabulary = SkillVocabulary::new(&config.skill_vocabulary, &config.skill_fields);
        if vocabulary.is_empty() {
            log::warn!("Skill vocabulary is empty; skill divergence will always be 0");
        }
        Ok(Self {
            config,
            vocabulary,
            history: RwLock::new(history),
            history_path,
            persist: tokio::sync::Mutex::new(()),
        })
    }

    pub const fn config(&self) -> &DriftConfig {
        &self.config
    }

    pub fn history(&self) -> DriftHistory {
        self.history.read().clone()
    }

    /// Record statistics for the postings of `ingestion_month` in `snapshot`.
    pub async fn record_cycle(
        &self,
        snapshot: &Snapshot<JobPosting>,
        ingestion_month: &str,
    ) -> Result<CycleSummary> {
        let postings = snapshot
            .records()
            .iter()
            .filter(|posting| posting.ingestion_month == ingestion_month)
            .map(AsRef::as_ref);
        self.record_postings(postings, snapshot.dimension(), ingestion_month)
            .await
    }

    /// Record one `DriftRecord` per category present in `postings`.
    ///
    /// Categories already recorded for `ingestion_month` are left untouched and listed
    /// as skipped.
    pub async fn record_postings<'a>(
        &self,
        postings: impl IntoIterator<Item = &'a JobPosting>,
        dimension: usize,
        ingestion_month: &str,
    ) -> Result<CycleSummary> {
        let mut by_category: BTreeMap<&str, Vec<&JobPosting>> = BTreeMap::new();
        let mut total = 0usize;
        for posting in postings {
            by_category
                .entry(posting.category.as_str())
                .or_default()
                .push(posting);
            total += 1;
        }

        let mut summary = CycleSummary {
            ingestion_month: ingestion_month.to_string(),
            postings: total,
            ..CycleSummary::default()
        };
        let mut fresh = Vec::with_capacity(by_category.len());
        {
            let history = self.history.read();
            for (category, members) in &by_category {
                if history.contains(category, ingestion_month) {
                    summary.skipped.push((*category).to_string());
                    continue;
                }
                if let Some(record) = self.summarize(category, members, dimension, ingestion_month) {
                    fresh.push(record);
                }
            }
        }

        // Records become visible only once written.
        let _persist = self.persist.lock().await;
        let mut next = self.history.read().clone();
        for record in fresh {
            let category = record.category.clone();
            match next.append(record) {
                Ok(()) => summary.recorded.push(category),
                Err(DriftError::DuplicateRecord { .. }) => summary.skipped.push(category),
                Err(err) => return Err(err),
            }
        }
        if !summary.recorded.is_empty() {
            if let Some(path) = &self.history_path {
                next.save(path).await?;
            }
            *self.history.write() = next;
        }

        if !summary.skipped.is_empty() {
            log::warn!(
                "Drift cycle {ingestion_month} already recorded for {} categor(ies): {}",
                summary.skipped.len(),
                summary.skipped.join(", ")
            );
        }
        log::info!(
            "Recorded drift cycle {ingestion_month}: {} posting(s), {} categor(ies)",
            summary.postings,
            summary.recorded.len()
        );
        Ok(summary)
    }

    fn summarize(
        &self,
        category: &str,
        members: &[&JobPosting],
        dimension: usize,
        ingestion_month: &str,
    ) -> Option<DriftRecord> {
        let vectors = || {
            members
                .iter()
                .map(|p| p.description_embedding.as_slice())
                .filter(|v| v.len() == dimension)
        };
        let Some(centre) = centroid(vectors(), dimension) else {
            log::warn!("No usable embeddings for category '{category}' in {ingestion_month}");
            return None;
        };
        let spread = dispersion(vectors(), &centre);
        let skills = self.vocabulary.frequencies(members.iter().copied());
        Some(DriftRecord::new(
            category,
            ingestion_month,
            members.len(),
            centre,
            spread,
            skills,
        ))
    }

    /// Drift of `category` between two recorded cycles.
    pub fn compute_drift(&self, category: &str, month_a: &str, month_b: &str) -> Result<DriftReport> {
        let history = self.history.read();
        let records = history.records_for(category).len();
        if records < 2 {
            return Err(DriftError::InsufficientHistory {
                category: category.to_string(),
                records,
            });
        }
        let lookup = |month: &str| {
            history
                .get(category, month)
                .ok_or_else(|| DriftError::RecordNotFound {
                    category: category.to_string(),
                    month: month.to_string(),
                })
        };
        let from = lookup(month_a)?;
        let to = lookup(month_b)?;
        self.report(from, to)
    }

    /// Reports for every category recorded in `month` against its previous recorded cycle.
    ///
    /// Categories seen for the first time in `month` are skipped.
    pub fn scan_cycle(&self, month: &str) -> Result<Vec<DriftReport>> {
        let history = self.history.read();
        let mut reports = Vec::new();
        for category in history.categories_in(month) {
            let Some(to) = history.get(category, month) else {
                continue;
            };
            let Some(from) = history.previous(category, month) else {
                log::debug!("No earlier cycle for '{category}'; skipping drift scan");
                continue;
            };
            reports.push(self.report(from, to)?);
        }
        let flagged = reports.iter().filter(|r| r.is_flagged()).count();
        log::info!(
            "Drift scan {month}: {} categor(ies) compared, {flagged} flagged",
            reports.len()
        );
        Ok(reports)
    }

    pub fn assess_distribution<'a>(
        &self,
        postings: impl IntoIterator<Item = &'a JobPosting>,
    ) -> DistributionReport {
        assess_distribution(postings, &self.config)
    }

    fn report(&self, from: &DriftRecord, to: &DriftRecord) -> Result<DriftReport> {
        if from.centroid.len() != to.centroid.len() {
            return Err(VectorStoreError::DimensionMismatch {
                expected: from.centroid.len(),
                actual: to.centroid.len(),
            }
            .into());
        }

        let shift = centroid_shift(&from.centroid, &to.centroid);
        let dispersion_delta = to.dispersion - from.dispersion;
        let (p, q) = aligned(&from.skill_frequencies, &to.skill_frequencies);
        let skill_divergence = jensen_shannon(&p, &q);

        let mut signals = Vec::new();
        for (metric, value, threshold) in [
            (DriftMetric::CentroidShift, shift, self.config.drift_threshold),
            (
                DriftMetric::Dispersion,
                dispersion_delta.abs(),
                self.config.dispersion_threshold,
            ),
            (
                DriftMetric::SkillDistribution,
                skill_divergence,
                self.config.skill_divergence_threshold,
            ),
        ] {
            if value > threshold {
                signals.push(DriftSignal {
                    metric,
                    value,
                    threshold,
                });
            }
        }
        if !signals.is_empty() {
            log::info!(
                "Drift flagged for '{}' ({} -> {}): {:?}",
                from.category,
                from.ingestion_month,
                to.ingestion_month,
                signals.iter().map(|s| s.metric).collect::<Vec<_>>()
            );
        }

        Ok(DriftReport {
            category: from.category.clone(),
            from_month: from.ingestion_month.clone(),
            to_month: to.ingestion_month.clone(),
            from_postings: from.posting_count,
            to_postings: to.posting_count,
            centroid_shift: shift,
            dispersion_delta,
            skill_divergence,
            signals,
        })
    }
}
