use crate::types::CollectionKind;
use std::path::{Path, PathBuf};

pub const DATA_DIR_NAME: &str = ".jobmatch";
pub const SNAPSHOTS_DIR_NAME: &str = "snapshots";
pub const CURRENT_POINTER_NAME: &str = "CURRENT";

#[must_use]
pub fn default_data_dir(root: &Path) -> PathBuf {
    root.join(DATA_DIR_NAME)
}

#[must_use]
pub fn table_path(data_dir: &Path, kind: CollectionKind) -> PathBuf {
    data_dir.join(format!("{}.json", kind.as_str()))
}

#[must_use]
pub fn snapshot_dir(data_dir: &Path, kind: CollectionKind) -> PathBuf {
    data_dir.join(SNAPSHOTS_DIR_NAME).join(kind.as_str())
}

#[must_use]
pub fn snapshot_path(data_dir: &Path, kind: CollectionKind, version: u64) -> PathBuf {
    snapshot_dir(data_dir, kind).join(format!("{version:020}.json"))
}

#[must_use]
pub fn current_pointer_path(data_dir: &Path, kind: CollectionKind) -> PathBuf {
    snapshot_dir(data_dir, kind).join(CURRENT_POINTER_NAME)
}

#[must_use]
pub fn drift_history_path(data_dir: &Path) -> PathBuf {
    data_dir.join("drift_history.json")
}

/// Exclusive lock file held by the process writing to `data_dir`.
#[must_use]
pub fn write_lock_path(data_dir: &Path) -> PathBuf {
    data_dir.join("write.lock")
}

#[must_use]
pub fn health_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join("health.json")
}

/// Parse the version out of a snapshot file name written by [`snapshot_path`].
#[must_use]
pub fn parse_snapshot_version(file_name: &str) -> Option<u64> {
    file_name.strip_suffix(".json")?.parse::<u64>().ok()
}
