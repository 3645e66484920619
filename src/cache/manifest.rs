//! Manifest index of known snapshot weeks
//!
//! The manifest lives at `<root>/index.json` and maps each logical key
//! (`owner/repo-or-_global_/category`) to the weeks stored for it. It is
//! only read or written while the caller holds the root's `CacheLock`.
//!
//! Reloads are lazy: `load` re-parses the file only when its stamp
//! (modification time, size and, on Unix, inode) differs from the last one
//! this process observed. Saves replace the file through a rename, so a
//! write from another process always produces a new stamp even when two
//! saves land within the same filesystem timestamp tick.

use crate::cache::atomic::atomic_write;
use crate::error::{RepoCacheError, RepoCacheResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// File name of the manifest inside a cache root
pub const MANIFEST_FILE_NAME: &str = "index.json";

/// Index entry for one logical key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Greatest known week, `None` only for an entry being emptied
    pub latest_week: Option<String>,

    /// Known weeks, unique, sorted descending
    pub weeks: Vec<String>,

    /// Last write to this key
    pub updated_at: DateTime<Utc>,
}

impl ManifestEntry {
    fn new(week: &str) -> Self {
        Self {
            latest_week: Some(week.to_string()),
            weeks: vec![week.to_string()],
            updated_at: Utc::now(),
        }
    }

    /// Whether `week` is recorded for this key
    pub fn contains(&self, week: &str) -> bool {
        self.weeks.iter().any(|w| w == week)
    }
}

/// On-disk manifest document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ManifestData {
    #[serde(default)]
    entries: BTreeMap<String, ManifestEntry>,
}

/// Identity of the manifest file as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
    inode: u64,
}

impl FileStamp {
    fn of(meta: &fs::Metadata) -> std::io::Result<Self> {
        #[cfg(unix)]
        let inode = std::os::unix::fs::MetadataExt::ino(meta);
        #[cfg(not(unix))]
        let inode = 0;

        Ok(Self {
            modified: meta.modified()?,
            len: meta.len(),
            inode,
        })
    }
}

/// In-memory manifest with a dirty flag and change tracking
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    data: ManifestData,
    dirty: bool,
    last_seen: Option<FileStamp>,
}

impl Manifest {
    /// Create a manifest handle for a cache root. Nothing is read until `load`.
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(MANIFEST_FILE_NAME),
            data: ManifestData::default(),
            dirty: false,
            last_seen: None,
        }
    }

    /// Path of the manifest file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether there are unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Re-read the manifest if the file changed since we last saw it.
    ///
    /// A missing file means an empty manifest. An undecodable file is
    /// logged and replaced by an empty manifest on the next save.
    pub fn load(&mut self) -> RepoCacheResult<()> {
        let stamp = match fs::metadata(&self.path).and_then(|m| FileStamp::of(&m)) {
            Ok(stamp) => stamp,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self.last_seen.take().is_some() {
                    debug!("Manifest {} disappeared, resetting", self.path.display());
                    self.data = ManifestData::default();
                }
                return Ok(());
            }
            Err(e) => {
                return Err(RepoCacheError::io(
                    format!("reading manifest metadata {}", self.path.display()),
                    e,
                ))
            }
        };

        if self.last_seen == Some(stamp) {
            return Ok(());
        }

        let content = fs::read(&self.path).map_err(|e| {
            RepoCacheError::io(format!("reading manifest {}", self.path.display()), e)
        })?;

        self.data = match serde_json::from_slice::<ManifestData>(&content) {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    "Manifest {} is corrupt ({}), starting from an empty index",
                    self.path.display(),
                    e
                );
                self.dirty = true;
                ManifestData::default()
            }
        };
        self.last_seen = Some(stamp);
        debug!(
            "Loaded manifest {} ({} entries)",
            self.path.display(),
            self.data.entries.len()
        );
        Ok(())
    }

    /// Persist the manifest if it has unsaved changes.
    pub fn save(&mut self) -> RepoCacheResult<()> {
        if !self.dirty {
            return Ok(());
        }

        let content = serde_json::to_vec_pretty(&self.data)?;
        let root = self.path.parent().unwrap_or_else(|| Path::new("."));
        atomic_write(root, &self.path, &content)?;

        self.dirty = false;
        self.last_seen = fs::metadata(&self.path)
            .and_then(|m| FileStamp::of(&m))
            .ok();
        Ok(())
    }

    /// Look up an entry
    pub fn entry(&self, key: &str) -> Option<&ManifestEntry> {
        self.data.entries.get(key)
    }

    /// All keys, in sorted order
    pub fn keys(&self) -> Vec<String> {
        self.data.entries.keys().cloned().collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.data.entries.len()
    }

    /// Whether the manifest has no entries
    pub fn is_empty(&self) -> bool {
        self.data.entries.is_empty()
    }

    /// Record that `week` exists for `key`.
    pub fn update_entry(&mut self, key: &str, week: &str) {
        match self.data.entries.get_mut(key) {
            None => {
                self.data
                    .entries
                    .insert(key.to_string(), ManifestEntry::new(week));
            }
            Some(entry) => {
                if !entry.contains(week) {
                    entry.weeks.push(week.to_string());
                }
                entry.weeks.sort_by(|a, b| b.cmp(a));

                let latest = match entry.latest_week.take() {
                    Some(current) if current.as_str() >= week => current,
                    _ => week.to_string(),
                };
                entry.latest_week = Some(latest);
                entry.updated_at = Utc::now();
            }
        }
        self.dirty = true;
    }

    /// Forget `week` for `key`, dropping the entry once it has no weeks.
    ///
    /// Returns whether anything changed.
    pub fn remove_week(&mut self, key: &str, week: &str) -> bool {
        let Some(entry) = self.data.entries.get_mut(key) else {
            return false;
        };
        let before = entry.weeks.len();
        entry.weeks.retain(|w| w != week);
        if entry.weeks.len() == before {
            return false;
        }

        if entry.weeks.is_empty() {
            self.data.entries.remove(key);
        } else if entry.latest_week.as_deref() == Some(week) {
            entry.weeks.sort_by(|a, b| b.cmp(a));
            entry.latest_week = entry.weeks.first().cloned();
        }
        self.dirty = true;
        true
    }

    /// Remove every entry whose key starts with `prefix`. Returns the count.
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let before = self.data.entries.len();
        self.data.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - self.data.entries.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Drop all entries
    pub fn reset(&mut self) {
        self.data = ManifestData::default();
        self.dirty = true;
    }

    #[cfg(test)]
    pub(crate) fn entry_mut(&mut self, key: &str) -> Option<&mut ManifestEntry> {
        self.dirty = true;
        self.data.entries.get_mut(key)
    }
}
