use serde::{Deserialize, Serialize};

/// Configuration for ingestion and retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Partitions this many months older than the current month are retired
    pub retention_window_months: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            retention_window_months: 6,
        }
    }
}
