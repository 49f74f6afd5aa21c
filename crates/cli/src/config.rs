use anyhow::{bail, Context, Result};
use jobmatch_drift::DriftConfig;
use jobmatch_indexer::IngestConfig;
use jobmatch_search::MatchConfig;
use jobmatch_vector_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for every component, loaded from one TOML file.
///
/// ```toml
/// [store]
/// embedding_dimension = 768
///
/// [ingest]
/// retention_window_months = 6
///
/// [matcher]
/// top_categories = 3
/// score_weights = { anchor = 0.5, job = 0.5 }
///
/// [drift]
/// drift_threshold = 0.05
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub matcher: MatchConfig,
    pub drift: DriftConfig,
}

impl AppConfig {
    /// Defaults when `path` is `None`; absent keys in the file also take defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.embedding_dimension == 0 {
            bail!("store.embedding_dimension must be positive");
        }
        if self.ingest.retention_window_months == 0 {
            bail!("ingest.retention_window_months must be positive");
        }
        self.matcher.validate().context("Invalid [matcher] section")?;
        self.drift.validate().context("Invalid [drift] section")?;
        Ok(())
    }
}
