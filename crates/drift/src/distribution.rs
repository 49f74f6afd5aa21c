use crate::config::DriftConfig;
use jobmatch_vector_store::JobPosting;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Collection priority for a category, derived from its share of all postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub category: String,
    pub count: usize,
    pub share_pct: f32,
    pub priority: Priority,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionReport {
    pub total: usize,
    pub categories: Vec<CategoryShare>,
}

impl DistributionReport {
    pub fn with_priority(&self, priority: Priority) -> impl Iterator<Item = &CategoryShare> {
        self.categories.iter().filter(move |c| c.priority == priority)
    }
}

/// Share of postings per category and the resulting collection priority.
///
/// Starved categories (below `starved_share_pct`) get `High` priority, saturated ones
/// (above `saturated_share_pct`) get `Low`, the rest `Medium`. No postings yields an
/// empty report.
pub fn assess_distribution<'a>(
    postings: impl IntoIterator<Item = &'a JobPosting>,
    config: &DriftConfig,
) -> DistributionReport {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut total = 0usize;
    for posting in postings {
        *counts.entry(posting.category.as_str()).or_default() += 1;
        total += 1;
    }
    if total == 0 {
        return DistributionReport::default();
    }

    let categories = counts
        .into_iter()
        .map(|(category, count)| {
            #[allow(clippy::cast_precision_loss)]
            let share_pct = count as f32 / total as f32 * 100.0;
            let (priority, reason) = if share_pct < config.starved_share_pct {
                (
                    Priority::High,
                    format!(
                        "Starved: only {share_pct:.2}% (threshold {}%)",
                        config.starved_share_pct
                    ),
                )
            } else if share_pct > config.saturated_share_pct {
                (
                    Priority::Low,
                    format!(
                        "Saturated: {share_pct:.2}% (threshold {}%)",
                        config.saturated_share_pct
                    ),
                )
            } else {
                (Priority::Medium, format!("Healthy: {share_pct:.2}%"))
            };
            CategoryShare {
                category: category.to_string(),
                count,
                share_pct,
                priority,
                reason,
            }
        })
        .collect();

    DistributionReport { total, categories }
}
