mod config;
mod error;
mod keywords;
mod matcher;
mod merge;

pub use config::{MatchConfig, ScoreWeights, Stage2Mode};
pub use error::{Result, SearchError};
pub use keywords::keyword_overlap;
pub use matcher::{match_snapshots, CategoryMatch, MatchReport, MatchRequest, TwoStageMatcher};
pub use merge::MatchResult;
