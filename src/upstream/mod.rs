//! Collaborators behind the cache: the GitHub data source and the summarizer
//!
//! The refresh layer talks to both through the traits here, so tests can
//! substitute in-memory fakes. Both concrete implementations are blocking.

pub mod anthropic;
pub mod credentials;
pub mod dependencies;
pub mod github;

pub use anthropic::AnthropicSummarizer;
pub use credentials::GithubCredentials;
pub use dependencies::{parse_dependency_file, Dependency, Ecosystem, TechnologyStack};
pub use github::GithubClient;

use crate::error::RepoCacheResult;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dependency manifests probed at a repository root. `*.csproj` files are
/// found through the root listing.
pub const DEPENDENCY_FILE_NAMES: &[&str] = &[
    "package.json",
    "requirements.txt",
    "pyproject.toml",
    "Gemfile",
    "go.mod",
    "pom.xml",
    "Cargo.toml",
    "composer.json",
];

/// Repository listing row: a name and its last push, if known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub name: String,
    pub pushed_at: Option<String>,
}

impl RepoRef {
    pub fn new(name: impl Into<String>, pushed_at: Option<&str>) -> Self {
        Self {
            name: name.into(),
            pushed_at: pushed_at.map(str::to_string),
        }
    }
}

/// Commit activity windows over the walked history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitCounts {
    pub total: u64,
    pub recent_90d: u64,
    pub recent_180d: u64,
    pub recent_365d: u64,
    pub last_commit_date: Option<DateTime<Utc>>,
}

impl CommitCounts {
    /// Tally commit author dates relative to `now`.
    ///
    /// Every commit counts toward `total`; commits without a date are left
    /// out of the windows.
    pub fn from_dates<I>(dates: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = Option<DateTime<Utc>>>,
    {
        let day_90 = now - Duration::days(90);
        let day_180 = now - Duration::days(180);
        let day_365 = now - Duration::days(365);

        let mut counts = Self::default();
        for date in dates {
            counts.total += 1;
            let Some(date) = date else {
                continue;
            };
            if counts.last_commit_date.map_or(true, |last| date > last) {
                counts.last_commit_date = Some(date);
            }
            if date >= day_90 {
                counts.recent_90d += 1;
            }
            if date >= day_180 {
                counts.recent_180d += 1;
            }
            if date >= day_365 {
                counts.recent_365d += 1;
            }
        }
        counts
    }
}

/// One entry of the recent commit list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub sha: String,
    pub date: Option<DateTime<Utc>>,
    pub message: String,
}

/// Source of repository data
pub trait UpstreamClient {
    /// All repositories of an owner with their push timestamps
    fn repositories(&self, owner: &str) -> RepoCacheResult<Vec<RepoRef>>;

    /// Commit activity counts
    fn commit_counts(&self, owner: &str, repo: &str) -> RepoCacheResult<CommitCounts>;

    /// Up to `limit` commits, newest first
    fn recent_commits(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> RepoCacheResult<Vec<CommitRecord>>;

    /// Bytes of code per language
    fn languages(&self, owner: &str, repo: &str) -> RepoCacheResult<BTreeMap<String, u64>>;

    /// README text, `None` when the repository has none
    fn readme(&self, owner: &str, repo: &str) -> RepoCacheResult<Option<String>>;

    /// Dependency manifests found at the repository root, by file name
    fn dependency_files(&self, owner: &str, repo: &str)
        -> RepoCacheResult<BTreeMap<String, String>>;
}

/// Everything the summarizer gets to look at for one repository
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub owner: String,
    pub repo: String,
    pub readme: Option<String>,
    pub commit_counts: Option<CommitCounts>,
    pub recent_commits: Vec<CommitRecord>,
    pub languages: BTreeMap<String, u64>,
    pub tech_stack: TechnologyStack,
}

/// Summarizer response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryOutput {
    pub text: String,
    pub model: String,
    pub tokens_used: u64,
    pub confidence_score: u8,
}

/// Produces a prose summary of a repository
pub trait Summarizer {
    fn summarize(&self, request: &SummaryRequest) -> RepoCacheResult<SummaryOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn commit_counts_windows() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let dates = vec![
            Some(now - Duration::days(10)),
            Some(now - Duration::days(100)),
            Some(now - Duration::days(200)),
            Some(now - Duration::days(400)),
            None,
        ];

        let counts = CommitCounts::from_dates(dates, now);
        assert_eq!(counts.total, 5);
        assert_eq!(counts.recent_90d, 1);
        assert_eq!(counts.recent_180d, 2);
        assert_eq!(counts.recent_365d, 3);
        assert_eq!(counts.last_commit_date, Some(now - Duration::days(10)));
    }

    #[test]
    fn commit_counts_empty_history() {
        let counts = CommitCounts::from_dates(Vec::new(), Utc::now());
        assert_eq!(counts, CommitCounts::default());
    }

    #[test]
    fn repo_ref_serializes_missing_push() {
        let json = serde_json::to_value(RepoRef::new("x", None)).unwrap();
        assert_eq!(json["name"], "x");
        assert!(json["pushed_at"].is_null());
    }
}
