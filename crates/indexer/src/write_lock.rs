use crate::{IndexerError, Result};
use fs2::FileExt;
use jobmatch_vector_store::paths::write_lock_path;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Exclusive advisory lock on a data directory.
///
/// One [`crate::IngestionManager`] per data directory writes tables, snapshots and
/// `CURRENT` at a time; the lock is released on drop.
#[derive(Debug)]
pub(crate) struct DataDirLock {
    file: File,
    path: PathBuf,
    wait_ms: u64,
}

impl DataDirLock {
    pub(crate) const fn wait_ms(&self) -> u64 {
        self.wait_ms
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            log::debug!("Failed to release {}: {err}", self.path.display());
        }
    }
}

/// Block until the write lock on `data_dir` is ours.
pub(crate) async fn acquire_write_lock(data_dir: &Path) -> Result<DataDirLock> {
    tokio::fs::create_dir_all(data_dir).await?;
    let path = write_lock_path(data_dir);

    tokio::task::spawn_blocking(move || -> Result<DataDirLock> {
        let file = open_lock_file(&path)?;
        let started = Instant::now();
        if file.try_lock_exclusive().is_err() {
            log::info!("Waiting for another writer to release {}", path.display());
            file.lock_exclusive().map_err(|err| {
                IndexerError::Other(format!("acquire write lock {}: {err}", path.display()))
            })?;
        }
        let wait_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(DataDirLock {
            file,
            path,
            wait_ms,
        })
    })
    .await?
}

/// Take the write lock on `data_dir` or fail with [`IndexerError::DataDirLocked`].
pub(crate) async fn try_acquire_write_lock(data_dir: &Path) -> Result<DataDirLock> {
    tokio::fs::create_dir_all(data_dir).await?;
    let path = write_lock_path(data_dir);

    tokio::task::spawn_blocking(move || -> Result<DataDirLock> {
        let file = open_lock_file(&path)?;
        if file.try_lock_exclusive().is_err() {
            return Err(IndexerError::DataDirLocked(path));
        }
        Ok(DataDirLock {
            file,
            path,
            wait_ms: 0,
        })
    })
    .await?
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|err| IndexerError::Other(format!("open write lock {}: {err}", path.display())))
}
