//! repocache - version-keyed snapshot cache for GitHub repository data
//!
//! Payloads fetched from GitHub (commit activity, languages, README,
//! dependency manifests, AI summaries) are stored as integrity-checked JSON
//! snapshots keyed by the repository's push timestamp.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod refresh;
pub mod status;
pub mod upstream;

pub use error::{RepoCacheError, RepoCacheResult};
