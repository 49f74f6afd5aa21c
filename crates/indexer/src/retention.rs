use crate::error::{IndexerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `YYYY-MM` ingestion partition tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionMonth {
    year: u32,
    month: u32,
}

impl PartitionMonth {
    pub fn new(year: u32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) || !(1000..=9999).contains(&year) {
            return Err(IndexerError::InvalidMonth(format!("{year:04}-{month:02}")));
        }
        Ok(Self { year, month })
    }

    #[must_use]
    pub const fn year(self) -> u32 {
        self.year
    }

    #[must_use]
    pub const fn month(self) -> u32 {
        self.month
    }

    /// Months since year zero; consecutive months differ by one.
    #[must_use]
    pub const fn ordinal(self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    /// True when this partition is at least `window` months older than `current`.
    #[must_use]
    pub const fn is_expired(self, current: Self, window: u32) -> bool {
        self.ordinal() <= current.ordinal() - window as i64
    }
}

impl FromStr for PartitionMonth {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || IndexerError::InvalidMonth(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse::<u32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl fmt::Display for PartitionMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl TryFrom<String> for PartitionMonth {
    type Error = IndexerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PartitionMonth> for String {
    fn from(value: PartitionMonth) -> Self {
        value.to_string()
    }
}

/// Partitions from `partitions` that fall outside the retention window.
///
/// Tags that are not valid months are never retired; they are logged and kept.
pub fn expired_partitions<'a>(
    partitions: impl IntoIterator<Item = &'a str>,
    current: PartitionMonth,
    window: u32,
) -> Vec<String> {
    partitions
        .into_iter()
        .filter(|tag| match tag.parse::<PartitionMonth>() {
            Ok(month) => month.is_expired(current, window),
            Err(_) => {
                log::warn!("Keeping partition with unrecognized tag '{tag}'");
                false
            }
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_and_formats() {
        let month: PartitionMonth = "2026-01".parse().unwrap();
        assert_eq!(month.year(), 2026);
        assert_eq!(month.month(), 1);
        assert_eq!(month.to_string(), "2026-01");

        for bad in ["2026-13", "2026-1", "26-01", "2026/01", "", "2026-00"] {
            assert!(bad.parse::<PartitionMonth>().is_err(), "{bad}");
        }
    }

    #[test]
    fn window_crosses_year_boundary() {
        let current: PartitionMonth = "2026-03".parse().unwrap();
        let expired = expired_partitions(
            ["2025-11", "2025-12", "2026-01", "2026-02", "2026-03", "legacy"],
            current,
            3,
        );
        assert_eq!(expired, vec!["2025-11", "2025-12"]);
    }

    #[test]
    fn zero_window_retires_everything_up_to_current() {
        let current: PartitionMonth = "2026-03".parse().unwrap();
        assert!(current.is_expired(current, 0));
        let next: PartitionMonth = "2026-04".parse().unwrap();
        assert!(!next.is_expired(current, 0));
    }
}
