//! Read-only freshness reports over the snapshot store

use crate::cache::{current_week, parse_pushed_at, sanitize_timestamp, SnapshotStore};
use crate::error::{RepoCacheError, RepoCacheResult};
use crate::refresh::Category;
use crate::upstream::RepoRef;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Categories reported on, in report order
const TRACKED: [Category; 6] = [
    Category::CommitsStats,
    Category::CommitCounts,
    Category::Languages,
    Category::DependencyFiles,
    Category::Readme,
    Category::AiSummary,
];

/// Why a repository needs a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshReason {
    /// An essential category has no snapshot for the push
    MissingCacheFiles,
    /// The push is newer than the newest snapshot write
    RepoHasNewCommits,
}

impl RefreshReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RefreshReason::MissingCacheFiles => "missing_cache_files",
            RefreshReason::RepoHasNewCommits => "repo_has_new_commits",
        }
    }
}

/// One category's cache state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheFileStatus {
    pub exists: bool,
    /// Last write to the category, whether or not it matches the push
    pub timestamp: Option<DateTime<Utc>>,
    pub age_hours: Option<f64>,
}

/// Freshness report for one repository
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    /// Every essential category is cached
    pub has_cache: bool,
    /// Newest write over existing files
    pub cache_date: Option<DateTime<Utc>>,
    /// Oldest write over existing files
    pub oldest_cache_date: Option<DateTime<Utc>>,
    pub cache_age_hours: Option<f64>,
    pub refresh_needed: bool,
    pub refresh_reasons: Vec<RefreshReason>,
    pub cache_files: BTreeMap<Category, CacheFileStatus>,
    /// Version key of the push, when one was given
    pub push_week: Option<String>,
    pub current_week: String,
}

/// Totals over a set of reports
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStatistics {
    pub total_repositories: usize,
    pub cached_repositories: usize,
    pub needs_refresh: usize,
    pub up_to_date: usize,
    /// Percent of repositories with every essential category cached
    pub cache_hit_rate: f64,
    /// Percent of repositories needing a refresh
    pub refresh_rate: f64,
}

pub struct CacheStatusTracker<'a> {
    store: &'a mut SnapshotStore,
}

impl<'a> CacheStatusTracker<'a> {
    pub fn new(store: &'a mut SnapshotStore) -> Self {
        Self { store }
    }

    /// Report which categories are cached for a push.
    ///
    /// Without `pushed_at`, any recorded week counts as cached.
    pub fn get_repository_cache_status(
        &mut self,
        owner: &str,
        repo: &str,
        pushed_at: Option<&str>,
    ) -> RepoCacheResult<CacheStatus> {
        let pushed = pushed_at.map(parse_pushed_at).transpose()?;
        let push_week = pushed.map(sanitize_timestamp);
        let now = Utc::now();

        let mut cache_files = BTreeMap::new();
        let mut oldest: Option<DateTime<Utc>> = None;
        let mut newest: Option<DateTime<Utc>> = None;
        let mut essentials_present = true;

        for category in TRACKED {
            let entry = self
                .store
                .get_entry_info(category.as_str(), owner, Some(repo))?;

            let (exists, timestamp) = match &entry {
                Some(entry) => {
                    let exists = match &push_week {
                        Some(key) => entry.contains(key),
                        None => entry.latest_week.is_some(),
                    };
                    (exists, Some(entry.updated_at))
                }
                None => (false, None),
            };

            if exists {
                if let Some(ts) = timestamp {
                    oldest = Some(oldest.map_or(ts, |o| o.min(ts)));
                    newest = Some(newest.map_or(ts, |n| n.max(ts)));
                }
            } else if category.is_essential() {
                essentials_present = false;
            }

            cache_files.insert(
                category,
                CacheFileStatus {
                    exists,
                    timestamp,
                    age_hours: timestamp.map(|ts| age_hours(now, ts)),
                },
            );
        }

        let mut refresh_reasons = Vec::new();
        if !essentials_present {
            refresh_reasons.push(RefreshReason::MissingCacheFiles);
        }
        if let (Some(pushed), Some(newest)) = (pushed, newest) {
            if pushed > newest {
                refresh_reasons.push(RefreshReason::RepoHasNewCommits);
            }
        }

        Ok(CacheStatus {
            has_cache: essentials_present,
            cache_date: newest,
            oldest_cache_date: oldest,
            cache_age_hours: newest.map(|ts| age_hours(now, ts)),
            refresh_needed: !refresh_reasons.is_empty(),
            refresh_reasons,
            cache_files,
            push_week,
            current_week: current_week(),
        })
    }

    /// Names of the repositories whose report asks for a refresh.
    ///
    /// A repository with an unparseable `pushed_at` is reported as needing one.
    pub fn repositories_needing_refresh(
        &mut self,
        owner: &str,
        repos: &[RepoRef],
    ) -> RepoCacheResult<Vec<String>> {
        let mut names = Vec::new();
        for (name, status) in self.statuses(owner, repos)? {
            if status.map_or(true, |s| s.refresh_needed) {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Reports for each repository. `None` marks an unparseable `pushed_at`.
    pub fn statuses(
        &mut self,
        owner: &str,
        repos: &[RepoRef],
    ) -> RepoCacheResult<Vec<(String, Option<CacheStatus>)>> {
        let mut out = Vec::with_capacity(repos.len());
        for repo in repos {
            let status = match self.get_repository_cache_status(
                owner,
                &repo.name,
                repo.pushed_at.as_deref(),
            ) {
                Ok(status) => Some(status),
                Err(RepoCacheError::InvalidTimestamp(raw)) => {
                    warn!("Ignoring pushed_at '{}' of {}", raw, repo.name);
                    None
                }
                Err(e) => return Err(e),
            };
            out.push((repo.name.clone(), status));
        }
        Ok(out)
    }
}

/// Aggregate a set of reports
pub fn get_cache_statistics<'s>(
    statuses: impl IntoIterator<Item = &'s CacheStatus>,
) -> CacheStatistics {
    let mut stats = CacheStatistics::default();
    for status in statuses {
        stats.total_repositories += 1;
        if status.has_cache {
            stats.cached_repositories += 1;
        }
        if status.refresh_needed {
            stats.needs_refresh += 1;
        }
    }
    stats.up_to_date = stats.total_repositories - stats.needs_refresh;
    if stats.total_repositories > 0 {
        let total = stats.total_repositories as f64;
        stats.cache_hit_rate = stats.cached_repositories as f64 / total * 100.0;
        stats.refresh_rate = stats.needs_refresh as f64 / total * 100.0;
    }
    stats
}

fn age_hours(now: DateTime<Utc>, ts: DateTime<Utc>) -> f64 {
    (now - ts).num_seconds() as f64 / 3600.0
}
