pub mod local;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use folio_types::error::{FolioError, Result};
use folio_types::SnapshotId;

pub use self::local::LocalContentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildKind {
    File,
    Directory,
}

/// One row of a shallow tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeChild {
    pub name: String,
    pub id: SnapshotId,
    pub kind: ChildKind,
    pub size: u64,
}

/// External content-addressed storage engine.
///
/// Implementations are blocking; the folder store runs every call on the
/// blocking pool under a timeout.
pub trait ContentStore: Send + Sync {
    /// Durably store the directory tree rooted at `root` and return its identifier.
    fn put_tree(&self, root: &Path) -> Result<SnapshotId>;

    /// Materialize snapshot `id` into the empty directory `dest`.
    ///
    /// Returns the path of the materialized tree root.
    fn get_tree(&self, id: &SnapshotId, dest: &Path) -> Result<PathBuf>;

    /// Shallow listing of a tree's children.
    fn list_children(&self, id: &SnapshotId) -> Result<Vec<TreeChild>>;

    /// Read one file at `/`-separated `path` inside snapshot `id`.
    ///
    /// `Ok(None)` if the path does not name a file in the snapshot.
    fn read_file(&self, id: &SnapshotId, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(parts) = split_tree_path(path) else {
            return Ok(None);
        };
        let scratch = tempfile::tempdir()?;
        let mut target = self.get_tree(id, scratch.path())?;
        target.extend(parts);
        if !target.is_file() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(&target)?))
    }
}

/// Split a `/`-separated in-tree path into components.
///
/// `None` for paths that could escape the tree (`..`, `.`, backslashes, NUL).
pub fn split_tree_path(path: &str) -> Option<Vec<&str>> {
    if path.contains('\\') || path.contains('\0') {
        return None;
    }
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.iter().any(|p| *p == "." || *p == "..") {
        return None;
    }
    Some(parts)
}

/// Run a blocking store call on the blocking pool, bounded by `timeout`.
///
/// Any failure other than [`FolioError::Corrupt`] surfaces as
/// [`FolioError::StoreUnavailable`]. A timed-out call keeps running
/// detached; its result is dropped.
pub(crate) async fn call_store<T, F>(timeout: Duration, op: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(FolioError::Corrupt(msg)))) => Err(FolioError::Corrupt(msg)),
        Ok(Ok(Err(e))) => Err(FolioError::StoreUnavailable(format!("{op}: {e}"))),
        Ok(Err(join_err)) => Err(FolioError::StoreUnavailable(format!(
            "{op}: store task failed: {join_err}"
        ))),
        Err(_) => Err(FolioError::StoreUnavailable(format!(
            "{op}: no response within {} ms",
            timeout.as_millis()
        ))),
    }
}
