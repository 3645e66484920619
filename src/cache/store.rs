//! Snapshot store
//!
//! Persists payloads under `<root>/<owner>/<repo|_global_>/<category>/<week>.json`
//! and indexes them in the manifest. Every operation that touches the
//! manifest holds the root's `CacheLock` for its whole load, mutate and save
//! sequence.
//!
//! Reads never fail on bad data: a snapshot whose hash doesn't match or
//! that can't be decoded is deleted and reported as a miss. Writes fail
//! fast.

use crate::cache::atomic::atomic_write;
use crate::cache::lock::{CacheLock, LOCK_FILE_NAME};
use crate::cache::manifest::{Manifest, ManifestEntry};
use crate::cache::snapshot::Snapshot;
use crate::cache::week::{
    check_component, current_week, normalize_week, sanitize_component, GLOBAL_REPO,
};
use crate::error::{RepoCacheError, RepoCacheResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Build the manifest key for `(owner, repo|global, category)`
pub fn logical_key(category: &str, owner: &str, repo: Option<&str>) -> String {
    format!("{}/{}/{}", owner, repo.unwrap_or(GLOBAL_REPO), category)
}

/// Split a manifest key back into `(owner, repo-or-_global_, category)`
fn key_parts(key: &str) -> Option<(&str, &str, &str)> {
    let (rest, category) = key.rsplit_once('/')?;
    let (owner, repo) = rest.split_once('/')?;
    Some((owner, repo, category))
}

/// Owner and repository must each own their directory
fn check_names(owner: &str, repo: Option<&str>) -> RepoCacheResult<()> {
    check_component(owner)?;
    match repo {
        Some(GLOBAL_REPO) => Err(RepoCacheError::InvalidKey {
            value: GLOBAL_REPO.to_string(),
            reason: "reserved for owner-wide snapshots".to_string(),
        }),
        Some(repo) => check_component(repo),
        None => Ok(()),
    }
}

/// File-backed snapshot cache rooted at one directory
#[derive(Debug)]
pub struct SnapshotStore {
    root: PathBuf,
    manifest: Manifest,
}

impl SnapshotStore {
    /// Open (and create if needed) a cache root
    pub fn open(root: impl Into<PathBuf>) -> RepoCacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            RepoCacheError::io(format!("creating cache root {}", root.display()), e)
        })?;
        let manifest = Manifest::new(&root);
        Ok(Self { root, manifest })
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the snapshot file for a key and week
    pub fn snapshot_path(
        &self,
        category: &str,
        owner: &str,
        repo: Option<&str>,
        week: &str,
    ) -> PathBuf {
        self.path_for(owner, repo.unwrap_or(GLOBAL_REPO), category, &normalize_week(week))
    }

    fn path_for(&self, owner: &str, repo_dir: &str, category: &str, week: &str) -> PathBuf {
        self.root
            .join(sanitize_component(owner))
            .join(sanitize_component(repo_dir))
            .join(sanitize_component(category))
            .join(format!("{}.json", sanitize_component(week)))
    }

    fn path_for_key(&self, key: &str, week: &str) -> Option<PathBuf> {
        key_parts(key).map(|(owner, repo, category)| self.path_for(owner, repo, category, week))
    }

    /// Fetch a payload. `week = None` resolves to the latest week.
    pub fn get(
        &mut self,
        category: &str,
        owner: &str,
        repo: Option<&str>,
        week: Option<&str>,
    ) -> RepoCacheResult<Option<Value>> {
        Ok(self
            .get_snapshot(category, owner, repo, week)?
            .map(|snapshot| snapshot.value))
    }

    /// Fetch a full snapshot, including its metadata.
    pub fn get_snapshot(
        &mut self,
        category: &str,
        owner: &str,
        repo: Option<&str>,
        week: Option<&str>,
    ) -> RepoCacheResult<Option<Snapshot>> {
        check_names(owner, repo)?;
        let _lock = CacheLock::acquire(&self.root)?;
        self.manifest.load()?;

        let key = logical_key(category, owner, repo);
        let week = match week {
            Some(week) => normalize_week(week),
            None => match self.manifest.entry(&key).and_then(|e| e.latest_week.clone()) {
                Some(latest) => latest,
                None => return Ok(None),
            },
        };
        let path = self.snapshot_path(category, owner, repo, &week);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!("Failed to read snapshot {}: {}", path.display(), e);
                return Ok(None);
            }
        };

        match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) if snapshot.verify() => Ok(Some(snapshot)),
            Ok(_) => {
                warn!("Snapshot {} failed its integrity check, discarding", path.display());
                self.discard(&key, &week, &path);
                Ok(None)
            }
            Err(e) => {
                warn!("Snapshot {} is corrupt ({}), discarding", path.display(), e);
                self.discard(&key, &week, &path);
                Ok(None)
            }
        }
    }

    /// Best-effort removal of a bad snapshot. Caller holds the lock.
    fn discard(&mut self, key: &str, week: &str, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to remove snapshot {}: {}", path.display(), e);
            }
        }
        if self.manifest.remove_week(key, week) {
            if let Err(e) = self.manifest.save() {
                warn!("Failed to save manifest after discarding {}: {}", path.display(), e);
            }
        }
    }

    /// Fetch a payload and decode it. A payload of the wrong shape is a miss.
    pub fn get_as<T: DeserializeOwned>(
        &mut self,
        category: &str,
        owner: &str,
        repo: Option<&str>,
        week: Option<&str>,
    ) -> RepoCacheResult<Option<T>> {
        let Some(value) = self.get(category, owner, repo, week)? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(e) => {
                debug!(
                    "Cached {} for {} has an unexpected shape: {}",
                    category,
                    logical_key(category, owner, repo),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Store a payload. `week = None` uses the current ISO week.
    pub fn set(
        &mut self,
        category: &str,
        owner: &str,
        value: Value,
        repo: Option<&str>,
        week: Option<&str>,
        metadata: Option<Value>,
    ) -> RepoCacheResult<()> {
        check_names(owner, repo)?;
        let week = week.map(normalize_week).unwrap_or_else(current_week);
        let snapshot = Snapshot::new(category, owner, repo, &week, value, metadata);
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        let key = logical_key(category, owner, repo);

        let _lock = CacheLock::acquire(&self.root)?;
        self.manifest.load()?;

        let path = self.snapshot_path(category, owner, repo, &week);
        atomic_write(&self.root, &path, &bytes)?;

        self.manifest.update_entry(&key, &week);
        self.manifest.save()?;

        debug!("Cached {} week {}", key, week);
        Ok(())
    }

    /// Serialize and store a typed payload
    pub fn set_as<T: Serialize>(
        &mut self,
        category: &str,
        owner: &str,
        value: &T,
        repo: Option<&str>,
        week: Option<&str>,
        metadata: Option<Value>,
    ) -> RepoCacheResult<()> {
        let value = serde_json::to_value(value)?;
        self.set(category, owner, value, repo, week, metadata)
    }

    /// Whether the manifest knows any week for this key
    pub fn has_entry(
        &mut self,
        category: &str,
        owner: &str,
        repo: Option<&str>,
    ) -> RepoCacheResult<bool> {
        Ok(self.get_entry_info(category, owner, repo)?.is_some())
    }

    /// Manifest entry for this key, without touching snapshot files
    pub fn get_entry_info(
        &mut self,
        category: &str,
        owner: &str,
        repo: Option<&str>,
    ) -> RepoCacheResult<Option<ManifestEntry>> {
        let _lock = CacheLock::acquire(&self.root)?;
        self.manifest.load()?;
        Ok(self
            .manifest
            .entry(&logical_key(category, owner, repo))
            .cloned())
    }

    /// All manifest entries, sorted by key
    pub fn list_entries(&mut self) -> RepoCacheResult<Vec<(String, ManifestEntry)>> {
        let _lock = CacheLock::acquire(&self.root)?;
        self.manifest.load()?;
        Ok(self
            .manifest
            .keys()
            .into_iter()
            .filter_map(|key| {
                let entry = self.manifest.entry(&key).cloned()?;
                Some((key, entry))
            })
            .collect())
    }

    /// Keep only the newest `keep_weeks` weeks of every key.
    ///
    /// Returns the number of snapshot files removed.
    pub fn prune(&mut self, keep_weeks: usize) -> RepoCacheResult<usize> {
        let _lock = CacheLock::acquire(&self.root)?;
        self.manifest.load()?;

        let mut removed = 0;
        for key in self.manifest.keys() {
            let Some(entry) = self.manifest.entry(&key) else {
                continue;
            };
            if entry.weeks.len() <= keep_weeks {
                continue;
            }

            let mut weeks = entry.weeks.clone();
            weeks.sort_by(|a, b| b.cmp(a));
            for week in weeks.into_iter().skip(keep_weeks) {
                if let Some(path) = self.path_for_key(&key, &week) {
                    match fs::remove_file(&path) {
                        Ok(()) => removed += 1,
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => {
                            return Err(RepoCacheError::io(
                                format!("removing snapshot {}", path.display()),
                                e,
                            ))
                        }
                    }
                }
                self.manifest.remove_week(&key, &week);
            }
        }

        self.manifest.save()?;
        if removed > 0 {
            info!("Pruned {} snapshot(s), keeping {} week(s) per key", removed, keep_weeks);
        }
        Ok(removed)
    }

    /// Remove every snapshot and reset the manifest. The lock file stays.
    pub fn clear(&mut self) -> RepoCacheResult<()> {
        let _lock = CacheLock::acquire(&self.root)?;

        let entries = fs::read_dir(&self.root)
            .map_err(|e| RepoCacheError::io("reading cache root", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| RepoCacheError::io("reading cache entry", e))?;
            if entry.file_name() == LOCK_FILE_NAME {
                continue;
            }
            let path = entry.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            result.map_err(|e| RepoCacheError::io(format!("removing {}", path.display()), e))?;
        }

        self.manifest.reset();
        self.manifest.save()?;
        info!("Cleared cache at {}", self.root.display());
        Ok(())
    }

    /// Remove all snapshots of one repository.
    ///
    /// Returns the number of snapshot files removed.
    pub fn clear_repository_cache(&mut self, owner: &str, repo: &str) -> RepoCacheResult<usize> {
        check_names(owner, Some(repo))?;
        let _lock = CacheLock::acquire(&self.root)?;
        self.manifest.load()?;

        let dir = self
            .root
            .join(sanitize_component(owner))
            .join(sanitize_component(repo));
        let count = count_snapshot_files(&dir)?;
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .map_err(|e| RepoCacheError::io(format!("removing {}", dir.display()), e))?;
        }

        let purged = self.manifest.remove_prefix(&format!("{}/{}/", owner, repo));
        self.manifest.save()?;

        debug!(
            "Cleared {} file(s) and {} manifest entr(ies) for {}/{}",
            count, purged, owner, repo
        );
        Ok(count)
    }

    #[cfg(test)]
    pub(crate) fn manifest_mut(&mut self) -> &mut Manifest {
        &mut self.manifest
    }
}

fn count_snapshot_files(dir: &Path) -> RepoCacheResult<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(RepoCacheError::io(format!("reading {}", dir.display()), e)),
    };

    let mut count = 0;
    for entry in entries {
        let path = entry
            .map_err(|e| RepoCacheError::io(format!("reading {}", dir.display()), e))?
            .path();
        if path.is_dir() {
            count += count_snapshot_files(&path)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            count += 1;
        }
    }
    Ok(count)
}
