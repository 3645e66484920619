//! CLI argument definitions using clap derive

use crate::refresh::Category;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// repocache - version-keyed snapshot cache for GitHub repository data
///
/// Snapshots are keyed by each repository's push timestamp, so cached data
/// is reused until the repository receives a new push.
#[derive(Parser, Debug)]
#[command(name = "repocache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "REPOCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache root (overrides cache.dir)
    #[arg(long, global = true, env = "REPOCACHE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show cache freshness for a repository, or for every listed repository of an owner
    Status(StatusArgs),

    /// Refresh cached data for an owner's repositories
    Refresh(RefreshArgs),

    /// Inspect and maintain the snapshot cache
    Cache(CacheArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Repository owner
    pub owner: String,

    /// Repository name (default: every repository in the cached listing)
    pub repo: Option<String>,

    /// Push timestamp to check against (RFC 3339)
    #[arg(long, requires = "repo")]
    pub pushed_at: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the refresh command
#[derive(Parser, Debug)]
pub struct RefreshArgs {
    /// Repository owner
    pub owner: String,

    /// Only these repositories (NAME or NAME@PUSHED_AT); skips the listing call
    #[arg(short, long = "repo", value_parser = parse_repo_spec)]
    pub repos: Vec<RepoSpec>,

    /// Categories to keep fresh (default: refresh.categories)
    #[arg(long, value_delimiter = ',')]
    pub categories: Vec<Category>,

    /// Refresh every tracked category even when the cache looks current
    #[arg(long)]
    pub force: bool,

    /// Also generate AI summaries
    #[arg(long)]
    pub summaries: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// `--repo` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSpec {
    pub name: String,
    pub pushed_at: Option<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached keys and their weeks
    Info {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Keep only the newest weeks of every key
    Prune {
        /// Weeks to keep per key (default: cache.keep_weeks)
        #[arg(long)]
        keep: Option<usize>,
    },

    /// Remove every snapshot
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Remove one repository's snapshots
    ClearRepo {
        /// Repository owner
        owner: String,
        /// Repository name
        repo: String,
    },

    /// Print the cache root
    Path,
}

/// Parse `NAME` or `NAME@PUSHED_AT`
fn parse_repo_spec(s: &str) -> Result<RepoSpec, String> {
    let (name, pushed_at) = match s.split_once('@') {
        Some((name, pushed_at)) => (name, Some(pushed_at.to_string())),
        None => (s, None),
    };
    if name.is_empty() {
        return Err(format!("missing repository name in '{s}'"));
    }
    if name.contains('/') {
        return Err(format!("'{name}' must be a bare repository name; pass the owner separately"));
    }
    Ok(RepoSpec {
        name: name.to_string(),
        pushed_at,
    })
}
