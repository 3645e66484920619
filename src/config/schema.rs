//! Configuration schema for repocache
//!
//! Configuration is stored at `~/.config/repocache/config.toml`

use crate::refresh::Category;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Snapshot cache settings
    pub cache: CacheConfig,

    /// GitHub API settings
    pub github: GithubConfig,

    /// AI summary settings
    pub summarizer: SummarizerConfig,

    /// Batch refresh defaults
    pub refresh: RefreshConfig,
}

impl Config {
    /// Cache root: the configured directory or the platform cache dir
    pub fn cache_root(&self) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(super::ConfigManager::default_cache_dir)
    }

    /// Log warnings for settings that are accepted but ignored
    pub fn warn_deprecated(&self) {
        if let Some(hours) = self.cache.ttl_hours {
            warn!(
                "cache.ttl_hours = {} is deprecated and ignored; snapshots are keyed by push time",
                hours
            );
        }
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Snapshot cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root (default: platform cache dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Weeks kept per key by `cache prune`
    pub keep_weeks: usize,

    /// Deprecated: wall-clock expiry is not supported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_hours: Option<u32>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            keep_weeks: 8,
            ttl_hours: None,
        }
    }
}

/// GitHub API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// API base URL (GitHub Enterprise: `https://host/api/v3`)
    pub api_url: String,

    /// Token; falls back to `GITHUB_TOKEN`, then `gh auth token`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Commits walked when counting activity
    pub commit_limit: usize,

    /// Commits kept in the recent commit list
    pub recent_commits: usize,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl GithubConfig {
    /// Host name for the gh CLI (`api.github.com` maps to `github.com`)
    pub fn host(&self) -> Option<&str> {
        let without_scheme = self
            .api_url
            .split_once("://")
            .map_or(self.api_url.as_str(), |(_, rest)| rest);
        let host = without_scheme.split('/').next()?;
        if host.is_empty() {
            return None;
        }
        Some(host.strip_prefix("api.").unwrap_or(host))
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            commit_limit: 1000,
            recent_commits: 200,
            timeout_secs: 30,
        }
    }
}

/// AI summary settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Generate summaries during refresh
    pub enabled: bool,

    /// Messages API base URL
    pub api_url: String,

    /// Model id
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Response token budget
    pub max_tokens: u32,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.anthropic.com".to_string(),
            model: "claude-3-5-haiku-20241022".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            max_tokens: 1500,
            timeout_secs: 60,
        }
    }
}

/// Batch refresh defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Categories kept fresh by `refresh`
    pub categories: Vec<Category>,

    /// Include AI summaries (widens to every category)
    pub include_ai_summaries: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            categories: Category::ESSENTIAL.to_vec(),
            include_ai_summaries: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[cache]"));
        assert!(toml.contains("[github]"));
        assert!(!toml.contains("ttl_hours"));
        assert!(!toml.contains("token"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cache.keep_weeks, 8);
        assert_eq!(config.github.commit_limit, 1000);
        assert_eq!(config.refresh.categories, Category::ESSENTIAL.to_vec());
        assert!(!config.summarizer.enabled);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [cache]
            dir = "/tmp/repocache"
            ttl_hours = 24

            [refresh]
            categories = ["languages", "readme"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache_root(), PathBuf::from("/tmp/repocache"));
        assert_eq!(config.cache.ttl_hours, Some(24));
        assert_eq!(config.cache.keep_weeks, 8); // default preserved
        assert_eq!(
            config.refresh.categories,
            vec![Category::Languages, Category::Readme]
        );
    }

    #[test]
    fn unknown_category_is_rejected() {
        let toml = r#"
            [refresh]
            categories = ["stars"]
        "#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn github_host() {
        let mut github = GithubConfig::default();
        assert_eq!(github.host(), Some("github.com"));

        github.api_url = "https://ghe.example.com/api/v3".to_string();
        assert_eq!(github.host(), Some("ghe.example.com"));

        github.api_url = String::new();
        assert_eq!(github.host(), None);
    }
}
