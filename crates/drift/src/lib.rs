//! Per-category drift tracking across ingestion cycles.
//!
//! Each recorded cycle stores a centroid, a dispersion statistic and skill-term
//! frequencies per category. Reports compare two cycles and flag values above the
//! configured thresholds; nothing here acts on a flag.

mod config;
mod distribution;
mod error;
mod history;
mod monitor;
mod statistics;
mod vocabulary;

pub use config::DriftConfig;
pub use distribution::{assess_distribution, CategoryShare, DistributionReport, Priority};
pub use error::{DriftError, Result};
pub use history::{DriftHistory, DriftRecord, DRIFT_SCHEMA_VERSION};
pub use monitor::{CycleSummary, DriftMetric, DriftMonitor, DriftReport, DriftSignal};
pub use statistics::{centroid, centroid_shift, dispersion, jensen_shannon};
pub use vocabulary::SkillVocabulary;
