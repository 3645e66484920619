//! Cross-process lock over a cache root
//!
//! Every manifest read or mutation happens while holding this lock. The
//! lock is an advisory `flock`-style lock on `<root>/.cache.lock` that
//! serializes processes. It says nothing about the in-memory manifest a
//! `SnapshotStore` keeps, so use one store per thread.
//!
//! Acquisition blocks without a timeout. A process that hangs while holding
//! the lock stalls every other process sharing the root; a process that
//! exits releases it through the OS.

use crate::error::{RepoCacheError, RepoCacheResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::trace;

/// File name of the lock inside a cache root
pub const LOCK_FILE_NAME: &str = ".cache.lock";

/// Exclusive lock on a cache root, released on drop
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Block until the exclusive lock for `root` is held.
    pub fn acquire(root: &Path) -> RepoCacheResult<Self> {
        let path = root.join(LOCK_FILE_NAME);
        let lock_err = |source| RepoCacheError::LockAcquire {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(root).map_err(lock_err)?;

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(lock_err)?;
        file.lock_exclusive().map_err(lock_err)?;

        trace!("Acquired cache lock {}", path.display());
        Ok(Self { file, path })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        trace!("Released cache lock {}", self.path.display());
    }
}
