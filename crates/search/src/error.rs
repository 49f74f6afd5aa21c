use jobmatch_vector_store::{CollectionKind, VectorStoreError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Vector store error: {0}")]
    VectorStoreError(VectorStoreError),

    /// No data to match against, as opposed to data that matches poorly
    #[error("Collection {0} is empty")]
    EmptyCollection(CollectionKind),

    #[error("Match did not finish within {timeout_ms} ms")]
    SearchTimeout { timeout_ms: u64 },

    #[error("Invalid match request: {0}")]
    InvalidRequest(String),

    #[error("Match task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<VectorStoreError> for SearchError {
    fn from(err: VectorStoreError) -> Self {
        match err {
            VectorStoreError::EmptyCollection(kind) => Self::EmptyCollection(kind),
            other => Self::VectorStoreError(other),
        }
    }
}
