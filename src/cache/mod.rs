//! Persistent snapshot cache for repository data
//!
//! Payloads are stored as one JSON file per `(owner, repo, category, week)`
//! and indexed by a manifest at the cache root. Each snapshot carries a
//! SHA-256 of its payload, checked on every read.
//!
//! # Layout
//!
//! | Path | Contents |
//! |------|----------|
//! | `<root>/.cache.lock` | Cross-process lock file |
//! | `<root>/index.json` | Manifest of known weeks per key |
//! | `<root>/<owner>/<repo>/<category>/<week>.json` | Repository snapshot |
//! | `<root>/<owner>/_global_/<category>/<week>.json` | Owner-wide snapshot |
//!
//! Weeks are ISO calendar weeks (`2026W09`) or sanitized push timestamps
//! (`2026-01-05T03-22-48+00-00`) used as version keys.

mod atomic;
pub mod lock;
pub mod manifest;
pub mod snapshot;
pub mod store;
pub mod week;

pub use lock::CacheLock;
pub use manifest::{Manifest, ManifestEntry};
pub use snapshot::{content_hash, Snapshot};
pub use store::{logical_key, SnapshotStore};
pub use week::{
    current_week, normalize_week, parse_pushed_at, sanitize_timestamp, version_key, week_of,
    GLOBAL_REPO,
};
