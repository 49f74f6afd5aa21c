use crate::error::{DriftError, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_SKILLS: &[&str] = &[
    "python",
    "sql",
    "java",
    "scala",
    "go",
    "rust",
    "typescript",
    "react",
    "spark",
    "airflow",
    "kafka",
    "dbt",
    "snowflake",
    "aws",
    "gcp",
    "azure",
    "docker",
    "kubernetes",
    "terraform",
    "pytorch",
    "tensorflow",
    "machine learning",
    "llm",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Flag when `1 - cos(centroid_a, centroid_b)` exceeds this
    pub drift_threshold: f32,

    /// Flag when the absolute dispersion change exceeds this
    pub dispersion_threshold: f32,

    /// Flag when the skill-term Jensen-Shannon divergence (bits) exceeds this
    pub skill_divergence_threshold: f32,

    /// Terms counted in posting metadata; matched case-insensitively on word boundaries
    pub skill_vocabulary: Vec<String>,

    /// Metadata fields scanned for skill terms (string or array-of-string values)
    pub skill_fields: Vec<String>,

    /// Categories below this share of all postings are under-represented
    pub starved_share_pct: f32,

    /// Categories above this share of all postings are over-represented
    pub saturated_share_pct: f32,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            drift_threshold: 0.05,
            dispersion_threshold: 0.05,
            skill_divergence_threshold: 0.1,
            skill_vocabulary: DEFAULT_SKILLS.iter().map(|s| (*s).to_string()).collect(),
            skill_fields: vec![
                "skills".to_string(),
                "description".to_string(),
                "requirements".to_string(),
            ],
            starved_share_pct: 2.0,
            saturated_share_pct: 15.0,
        }
    }
}

impl DriftConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("drift_threshold", self.drift_threshold),
            ("dispersion_threshold", self.dispersion_threshold),
            ("skill_divergence_threshold", self.skill_divergence_threshold),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(DriftError::InvalidConfig(format!(
                    "{name} {value} outside [0, 2]"
                )));
            }
        }
        if !(0.0..=100.0).contains(&self.starved_share_pct)
            || !(0.0..=100.0).contains(&self.saturated_share_pct)
            || self.starved_share_pct > self.saturated_share_pct
        {
            return Err(DriftError::InvalidConfig(format!(
                "share thresholds must satisfy 0 <= starved ({}) <= saturated ({}) <= 100",
                self.starved_share_pct, self.saturated_share_pct
            )));
        }
        Ok(())
    }
}
