use crate::Result;
use jobmatch_vector_store::paths::health_file_path;
use jobmatch_vector_store::{write_atomic, CollectionKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;

const MAX_FAILURES: usize = 5;

/// Snapshot persisted to `<data-dir>/health.json` so other processes can
/// report the last successful rebuild.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub last_success_unix_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_indexed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_per_sec: Option<f32>,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failure_reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_unix_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_count: Option<usize>,
}

/// Result of one published rebuild, as recorded in the health file.
#[derive(Debug, Clone, Copy)]
pub struct RebuildHealth<'a> {
    pub collection: CollectionKind,
    pub version: u64,
    pub records: usize,
    pub duration_ms: u64,
    pub snapshot_path: Option<&'a Path>,
}

pub async fn write_health_snapshot(
    data_dir: &Path,
    rebuild: RebuildHealth<'_>,
    reason: &str,
) -> Result<HealthSnapshot> {
    let snapshot_size_bytes = match rebuild.snapshot_path {
        Some(path) => fs::metadata(path).await.ok().map(|m| m.len()),
        None => None,
    };
    let records_per_sec = if rebuild.duration_ms > 0 {
        #[allow(clippy::cast_precision_loss)]
        Some(rebuild.records as f32 / (rebuild.duration_ms as f32 / 1000.0))
    } else {
        None
    };
    let snapshot = HealthSnapshot {
        last_success_unix_ms: current_unix_ms(),
        last_duration_ms: Some(rebuild.duration_ms),
        collection: Some(rebuild.collection),
        snapshot_version: Some(rebuild.version),
        records_indexed: Some(rebuild.records),
        records_per_sec,
        reason: reason.to_string(),
        failure_reasons: Vec::new(),
        last_failure_unix_ms: None,
        last_failure_reason: None,
        snapshot_size_bytes,
        failure_count: Some(0),
    };

    let data = serde_json::to_vec_pretty(&snapshot)?;
    write_atomic(&health_file_path(data_dir), &data).await?;
    Ok(snapshot)
}

pub async fn append_failure_reason(data_dir: &Path, reason: &str, detail: &str) -> Result<()> {
    let mut snapshot = read_health_snapshot(data_dir)
        .await?
        .unwrap_or_else(|| HealthSnapshot {
            reason: "failure".to_string(),
            ..HealthSnapshot::default()
        });

    snapshot.failure_reasons.push(format!("{reason}: {detail}"));
    snapshot.last_failure_unix_ms = Some(current_unix_ms());
    snapshot.last_failure_reason = Some(detail.to_string());
    if snapshot.failure_reasons.len() > MAX_FAILURES {
        let start = snapshot.failure_reasons.len() - MAX_FAILURES;
        snapshot.failure_reasons = snapshot.failure_reasons.split_off(start);
    }
    snapshot.failure_count = Some(snapshot.failure_reasons.len());

    let data = serde_json::to_vec_pretty(&snapshot)?;
    write_atomic(&health_file_path(data_dir), &data).await?;
    Ok(())
}

pub async fn read_health_snapshot(data_dir: &Path) -> Result<Option<HealthSnapshot>> {
    let path = health_file_path(data_dir);
    match fs::read(&path).await {
        Ok(bytes) => {
            let snapshot = serde_json::from_slice(&bytes)?;
            Ok(Some(snapshot))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|dur| u64::try_from(dur.as_millis()).ok())
        .unwrap_or(0)
}
