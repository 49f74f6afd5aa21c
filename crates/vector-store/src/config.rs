use serde::{Deserialize, Serialize};

/// HNSW construction and query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnBuildParams {
    /// Target out-degree per node on upper layers (layer 0 allows twice this)
    pub max_degree: usize,

    /// Candidate list breadth while inserting
    pub ef_construction: usize,

    /// Candidate list breadth while querying
    pub ef_search: usize,

    /// Seed for level assignment; fixed so rebuilds of the same data are identical
    pub seed: u64,

    /// Collections (or filtered subsets) at or below this size are scanned exactly
    pub exact_scan_below: usize,
}

impl Default for AnnBuildParams {
    fn default() -> Self {
        Self {
            max_degree: 16,
            ef_construction: 100,
            ef_search: 64,
            seed: 0x5eed_cafe,
            exact_scan_below: 256,
        }
    }
}

impl AnnBuildParams {
    pub(crate) fn max_degree(&self) -> usize {
        self.max_degree.max(2)
    }

    pub(crate) fn layer0_degree(&self) -> usize {
        self.max_degree() * 2
    }
}

/// Configuration for the embedding store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Every stored vector must have exactly this many components
    pub embedding_dimension: usize,

    pub ann_build_params: AnnBuildParams,

    /// Superseded snapshots kept per collection for rollback
    pub retained_snapshots: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            embedding_dimension: 768,
            ann_build_params: AnnBuildParams::default(),
            retained_snapshots: 2,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            embedding_dimension: dimension,
            ..Self::default()
        }
    }
}
