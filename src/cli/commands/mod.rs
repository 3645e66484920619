//! CLI command implementations

pub mod cache;
pub mod config;
pub mod refresh;
pub mod status;

pub use cache::execute as cache;
pub use config::execute as config;
pub use refresh::execute as refresh;
pub use status::execute as status;

use crate::cache::SnapshotStore;
use crate::error::{RepoCacheError, RepoCacheResult};
use std::path::PathBuf;

/// Run blocking cache work off the async runtime
pub(crate) async fn blocking<T, F>(f: F) -> RepoCacheResult<T>
where
    F: FnOnce() -> RepoCacheResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RepoCacheError::Internal(format!("blocking task failed: {}", e)))?
}

/// Open the store at `root` on the blocking pool
pub(crate) async fn open_store(root: PathBuf) -> RepoCacheResult<SnapshotStore> {
    blocking(move || SnapshotStore::open(root)).await
}
