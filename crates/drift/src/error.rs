use thiserror::Error;

pub type Result<T> = std::result::Result<T, DriftError>;

#[derive(Error, Debug)]
pub enum DriftError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] jobmatch_vector_store::VectorStoreError),

    #[error("Category '{category}' has {records} drift record(s); at least two are needed")]
    InsufficientHistory { category: String, records: usize },

    #[error("No drift record for category '{category}' in {month}")]
    RecordNotFound { category: String, month: String },

    #[error("Drift record for category '{category}' in {month} already exists")]
    DuplicateRecord { category: String, month: String },

    #[error("Drift history schema version {found} is not supported (expected {expected})")]
    UnsupportedSchema { found: u32, expected: u32 },

    #[error("Invalid drift configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}
