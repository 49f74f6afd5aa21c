use crate::types::CollectionKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector component {position} is NaN or infinite")]
    NonFiniteComponent { position: usize },

    #[error("Missing record key in {0} collection")]
    MissingKey(CollectionKind),

    #[error("Collection {0} has no records to search")]
    EmptyCollection(CollectionKind),

    #[error("Refusing to publish {kind} snapshot v{attempted}: current is v{current}")]
    StaleSnapshot {
        kind: CollectionKind,
        current: u64,
        attempted: u64,
    },

    #[error("No retained {0} snapshot to roll back to")]
    NoRetainedSnapshot(CollectionKind),

    #[error("Index build cancelled")]
    Cancelled,

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Corrupt store data: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
