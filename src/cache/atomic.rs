//! Atomic file replacement

use crate::error::{RepoCacheError, RepoCacheResult};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Write `bytes` to `dest` through a temp file created in `tmp_dir`.
///
/// `tmp_dir` must be on the same filesystem as `dest` so the final rename is
/// atomic. Readers see either the old file or the complete new one. On any
/// failure the temp file is removed and the error is returned.
pub(crate) fn atomic_write(tmp_dir: &Path, dest: &Path, bytes: &[u8]) -> RepoCacheResult<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| RepoCacheError::write(parent, e))?;
    }

    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .suffix(".json")
        .tempfile_in(tmp_dir)
        .map_err(|e| RepoCacheError::write(dest, e))?;

    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| RepoCacheError::write(dest, e))?;

    tmp.persist(dest)
        .map_err(|e| RepoCacheError::write(dest, e.error))?;

    Ok(())
}
