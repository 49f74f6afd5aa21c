use crate::validation::ValidationError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] jobmatch_vector_store::VectorStoreError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(ValidationError),

    #[error("Invalid partition month: {0}")]
    InvalidMonth(String),

    #[error("Data directory is locked by another writer: {}", .0.display())]
    DataDirLocked(std::path::PathBuf),

    #[error("Rebuild cancelled before publish")]
    Cancelled,

    #[error("Rebuild task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Normalize store-level cancellation into [`IndexerError::Cancelled`].
    pub(crate) fn from_store(err: jobmatch_vector_store::VectorStoreError) -> Self {
        match err {
            jobmatch_vector_store::VectorStoreError::Cancelled => Self::Cancelled,
            other => Self::VectorStoreError(other),
        }
    }
}
