//! Refresh orchestration
//!
//! Snapshots are keyed by the repository's sanitized `pushed_at`, so a
//! cached payload stays valid until the repository receives a new push.
//! There is no wall-clock expiry.

mod manager;

pub use manager::{CacheManager, REPOSITORIES};

use crate::error::RepoCacheError;
use crate::upstream::TechnologyStack;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cached data category. Declaration order is refresh order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    CommitsStats,
    CommitCounts,
    Languages,
    Readme,
    DependencyFiles,
    AiSummary,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::CommitsStats,
        Category::CommitCounts,
        Category::Languages,
        Category::Readme,
        Category::DependencyFiles,
        Category::AiSummary,
    ];

    /// Categories whose absence makes a repository need a refresh
    pub const ESSENTIAL: [Category; 3] = [
        Category::CommitsStats,
        Category::CommitCounts,
        Category::Languages,
    ];

    /// Refreshed when no categories are requested
    pub const DEFAULT_REFRESH: [Category; 2] = [Category::CommitCounts, Category::Languages];

    /// Inputs of an AI summary
    pub const SUMMARY_INPUTS: [Category; 4] = [
        Category::CommitCounts,
        Category::Languages,
        Category::Readme,
        Category::DependencyFiles,
    ];

    /// On-disk name
    pub fn as_str(self) -> &'static str {
        match self {
            Category::CommitsStats => "commits_stats",
            Category::CommitCounts => "commit_counts",
            Category::Languages => "languages",
            Category::Readme => "readme",
            Category::DependencyFiles => "dependency_files",
            Category::AiSummary => "ai_summary",
        }
    }

    pub fn is_essential(self) -> bool {
        Self::ESSENTIAL.contains(&self)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = RepoCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                RepoCacheError::User(format!(
                    "Unknown category '{}'. Expected one of: {}",
                    s,
                    Category::ALL.map(Category::as_str).join(", ")
                ))
            })
    }
}

/// Outcome of refreshing one category of one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshResult {
    pub repo_name: String,
    pub category: Category,
    pub was_cached: bool,
    pub refreshed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RefreshResult {
    pub fn cached(repo_name: &str, category: Category) -> Self {
        Self {
            repo_name: repo_name.to_string(),
            category,
            was_cached: true,
            refreshed: false,
            error: None,
        }
    }

    pub fn refreshed(repo_name: &str, category: Category) -> Self {
        Self {
            repo_name: repo_name.to_string(),
            category,
            was_cached: false,
            refreshed: true,
            error: None,
        }
    }

    pub fn failed(repo_name: &str, category: Category, error: impl Into<String>) -> Self {
        Self {
            repo_name: repo_name.to_string(),
            category,
            was_cached: false,
            refreshed: false,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Totals of a batch refresh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub total_repos: usize,
    pub repos_refreshed: usize,
    pub repos_unchanged: usize,
    pub repos_failed: usize,
    /// Repositories without a usable `pushed_at`
    pub repos_skipped: usize,
    pub results: Vec<RefreshResult>,
    pub api_calls_made: u64,
}

/// Cached AI summary payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiSummaryRecord {
    pub summary: String,
    pub model: String,
    pub tokens_used: u64,
    pub confidence_score: u8,
    pub tech_stack: TechnologyStack,
    pub generated_at: DateTime<Utc>,
}
