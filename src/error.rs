//! Error types for repocache
//!
//! All modules use `RepoCacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for repocache operations
pub type RepoCacheResult<T> = Result<T, RepoCacheError>;

/// All errors that can occur in repocache
#[derive(Error, Debug)]
pub enum RepoCacheError {
    // Cache errors
    #[error("Failed to acquire cache lock {path}: {source}")]
    LockAcquire {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write cache file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid cache key component '{value}': {reason}")]
    InvalidKey { value: String, reason: String },

    #[error("Invalid timestamp '{0}'. Expected RFC 3339, e.g. 2026-01-05T03:22:48Z")]
    InvalidTimestamp(String),

    // Collaborator errors
    #[error("GitHub token not found. Set GITHUB_TOKEN or run: gh auth login")]
    GithubNotAuthenticated,

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Upstream returned HTTP {status} for {url}")]
    UpstreamStatus { status: u16, url: String },

    #[error("Summarizer error: {0}")]
    Summarizer(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl RepoCacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a write error for a cache path
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::GithubNotAuthenticated => Some("Run: gh auth login"),
            Self::UpstreamStatus { status: 403, .. } | Self::UpstreamStatus { status: 429, .. } => {
                Some("GitHub rate limit reached; cached data is still served. Retry later")
            }
            Self::LockAcquire { .. } => {
                Some("Another repocache process may be holding the lock; check for stalled runs")
            }
            Self::InvalidTimestamp(_) => Some("Use the repository's pushed_at value from the GitHub API"),
            _ => None,
        }
    }
}
