use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use folio_types::error::{FolioError, Result};
use folio_types::SnapshotId;

use crate::config::FolioConfig;
use crate::engine::edit::{Content, Edit, FileSet};
use crate::engine::{FolderStore, MutationOutcome};
use crate::folder::EntryKind;
use crate::store::{ContentStore, LocalContentStore, TreeChild};

pub fn test_config(dir: &Path) -> FolioConfig {
    FolioConfig {
        store_timeout_ms: 5_000,
        ..FolioConfig::with_data_dir(dir.join("data"))
    }
}

pub fn local_store(dir: &Path) -> LocalContentStore {
    LocalContentStore::new(dir.join("objects")).unwrap()
}

pub fn open_store(dir: &Path) -> FolderStore {
    FolderStore::open(test_config(dir), Arc::new(local_store(dir))).unwrap()
}

pub fn open_with(config: FolioConfig, store: Arc<dyn ContentStore>) -> FolderStore {
    FolderStore::open(config, store).unwrap()
}

/// Register `alias` with `limit` bytes and create its folder.
pub async fn bootstrap(store: &FolderStore, alias: &str, limit: u64) -> MutationOutcome {
    store.register_account(alias, limit).await.unwrap();
    store.mutate(alias, Edit::CreateFolder).await.unwrap()
}

pub fn files(entries: &[(&str, &str)]) -> FileSet {
    entries
        .iter()
        .map(|(path, body)| (path.to_string(), Content::text(*body)))
        .collect()
}

pub fn website(name: &str, entries: &[(&str, &str)]) -> Edit {
    Edit::PutWebsite {
        name: name.to_string(),
        files: files(entries),
        metadata: None,
    }
}

pub fn text_file(name: &str, body: &str) -> Edit {
    Edit::PutFile {
        name: name.to_string(),
        content: Content::text(body),
    }
}

pub fn delete(kind: EntryKind, name: &str) -> Edit {
    Edit::DeleteEntry {
        kind,
        name: name.to_string(),
    }
}

/// Local store whose reads and writes can be made to fail.
pub struct FailingStore {
    inner: LocalContentStore,
    pub fail_get: AtomicBool,
    pub fail_put: AtomicBool,
}

impl FailingStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            inner: local_store(dir),
            fail_get: AtomicBool::new(false),
            fail_put: AtomicBool::new(false),
        }
    }
}

impl ContentStore for FailingStore {
    fn put_tree(&self, root: &Path) -> Result<SnapshotId> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(FolioError::StoreUnavailable("injected put failure".into()));
        }
        self.inner.put_tree(root)
    }

    fn get_tree(&self, id: &SnapshotId, dest: &Path) -> Result<PathBuf> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(FolioError::StoreUnavailable("injected get failure".into()));
        }
        self.inner.get_tree(id, dest)
    }

    fn list_children(&self, id: &SnapshotId) -> Result<Vec<TreeChild>> {
        self.inner.list_children(id)
    }
}

/// Local store that sleeps before reads or writes once switched on.
pub struct SlowStore {
    inner: LocalContentStore,
    delay: Duration,
    pub slow_get: AtomicBool,
    pub slow_put: AtomicBool,
}

impl SlowStore {
    pub fn new(dir: &Path, delay: Duration) -> Self {
        Self {
            inner: local_store(dir),
            delay,
            slow_get: AtomicBool::new(false),
            slow_put: AtomicBool::new(false),
        }
    }
}

impl ContentStore for SlowStore {
    fn put_tree(&self, root: &Path) -> Result<SnapshotId> {
        if self.slow_put.load(Ordering::SeqCst) {
            std::thread::sleep(self.delay);
        }
        self.inner.put_tree(root)
    }

    fn get_tree(&self, id: &SnapshotId, dest: &Path) -> Result<PathBuf> {
        if self.slow_get.load(Ordering::SeqCst) {
            std::thread::sleep(self.delay);
        }
        self.inner.get_tree(id, dest)
    }

    fn list_children(&self, id: &SnapshotId) -> Result<Vec<TreeChild>> {
        self.inner.list_children(id)
    }
}

/// Local store that counts calls.
pub struct CountingStore {
    inner: LocalContentStore,
    pub puts: AtomicUsize,
    pub gets: AtomicUsize,
    pub lists: AtomicUsize,
}

impl CountingStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            inner: local_store(dir),
            puts: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
        }
    }

    pub fn io_calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst) + self.gets.load(Ordering::SeqCst)
    }
}

impl ContentStore for CountingStore {
    fn put_tree(&self, root: &Path) -> Result<SnapshotId> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put_tree(root)
    }

    fn get_tree(&self, id: &SnapshotId, dest: &Path) -> Result<PathBuf> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_tree(id, dest)
    }

    fn list_children(&self, id: &SnapshotId) -> Result<Vec<TreeChild>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list_children(id)
    }
}
