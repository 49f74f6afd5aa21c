use crate::validation::ValidationError;
use jobmatch_vector_store::{CollectionKind, UpsertOutcome};
use serde::{Deserialize, Serialize};

/// Outcome of one ingestion batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub collection: CollectionKind,

    /// Records submitted by the caller
    pub received: usize,

    /// Records inserted or replaced
    pub committed: usize,

    /// Records identical to what was already stored
    pub unchanged: usize,

    /// Earlier duplicates dropped in favour of a later record with the same key
    pub deduplicated: usize,

    /// Malformed records skipped
    pub failed: Vec<ValidationError>,

    /// Time taken in milliseconds
    pub time_ms: u64,
}

impl IngestReport {
    #[must_use]
    pub const fn new(collection: CollectionKind) -> Self {
        Self {
            collection,
            received: 0,
            committed: 0,
            unchanged: 0,
            deduplicated: 0,
            failed: Vec::new(),
            time_ms: 0,
        }
    }

    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted | UpsertOutcome::Replaced => self.committed += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn add_failure(&mut self, error: ValidationError) {
        log::warn!("Skipping {error}");
        self.failed.push(error);
    }

    /// True when the batch changed the metadata table.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.committed > 0
    }

    /// Fold the report of a later batch into this one.
    pub fn merge(&mut self, other: Self) {
        self.received += other.received;
        self.committed += other.committed;
        self.unchanged += other.unchanged;
        self.deduplicated += other.deduplicated;
        self.failed.extend(other.failed);
        self.time_ms += other.time_ms;
    }
}
