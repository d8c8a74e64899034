//! Read side: resolving ids and site names against committed state.
//!
//! Readers take the ledger read lock only long enough to copy what they need;
//! they never wait on an account lock.

use serde::Serialize;

use folio_types::error::{FolioError, Result};
use folio_types::SnapshotId;

use crate::engine::FolderStore;
use crate::folder::{EntryCounts, EntryKind, FolderEntry};
use crate::history::HistoryRecord;
use crate::ledger::Account;
use crate::site::{SiteRecord, SiteTarget, VersionRecord};
use crate::store::{call_store, split_tree_path, ChildKind, ContentStore};

pub const DEFAULT_TREE_DEPTH: usize = 10;
const DEFAULT_DOCUMENT: &str = "index.html";

/// Where to fetch a site's content right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SiteLocation {
    Direct {
        snapshot: SnapshotId,
    },
    /// `snapshot` is the account's live id at the time of the call.
    Folder {
        account: String,
        path: String,
        snapshot: SnapshotId,
    },
}

impl SiteLocation {
    pub fn snapshot(&self) -> &SnapshotId {
        match self {
            SiteLocation::Direct { snapshot } | SiteLocation::Folder { snapshot, .. } => snapshot,
        }
    }

    /// In-tree path of the site root; empty for direct sites.
    pub fn path(&self) -> &str {
        match self {
            SiteLocation::Direct { .. } => "",
            SiteLocation::Folder { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteSummary {
    pub name: String,
    pub target: SiteTarget,
    pub created: chrono::DateTime<chrono::Utc>,
    pub updated: chrono::DateTime<chrono::Utc>,
    pub versions: usize,
}

/// Recursive listing of a stored tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeView {
    pub name: String,
    pub id: SnapshotId,
    pub kind: ChildKind,
    pub size: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeView>,
    /// Set when `max_depth` stopped the walk below this directory.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub accounts: usize,
    pub folders: usize,
    pub sites: usize,
    pub entries: usize,
    pub redirects: usize,
    pub snapshots: usize,
}

impl FolderStore {
    pub fn account(&self, alias: &str) -> Result<Account> {
        self.read(|ledger| ledger.account(alias).cloned())
    }

    /// Current snapshot id of `alias`'s folder.
    pub fn resolve_live(&self, alias: &str) -> Result<SnapshotId> {
        self.read(|ledger| ledger.current_of(alias))
    }

    /// Live id for any id ever issued; ids the table does not know are returned unchanged.
    pub fn resolve_historical(&self, id: &SnapshotId) -> SnapshotId {
        self.read(|ledger| ledger.redirects.resolve(id))
    }

    /// Locate `name`. Folder-backed sites re-resolve the account's live id every call.
    pub fn locate_site(&self, name: &str) -> Result<SiteLocation> {
        self.read(|ledger| -> Result<SiteLocation> {
            let site = ledger
                .sites
                .get(name)
                .ok_or_else(|| FolioError::NotFound(format!("site '{name}'")))?;
            match &site.target {
                SiteTarget::Direct { snapshot } => Ok(SiteLocation::Direct {
                    snapshot: snapshot.clone(),
                }),
                SiteTarget::Folder { account, path } => Ok(SiteLocation::Folder {
                    account: account.clone(),
                    path: path.clone(),
                    snapshot: ledger.current_of(account)?,
                }),
            }
        })
    }

    pub fn site(&self, name: &str) -> Result<SiteRecord> {
        self.read(|ledger| {
            ledger
                .sites
                .get(name)
                .cloned()
                .ok_or_else(|| FolioError::NotFound(format!("site '{name}'")))
        })
    }

    /// Version chain of a site.
    ///
    /// Direct sites return their own records. Folder-backed sites derive one
    /// version per folder history record whose roster contains the site.
    pub fn site_history(&self, name: &str) -> Result<Vec<VersionRecord>> {
        let limit = self.config.history_limit;
        self.read(|ledger| -> Result<Vec<VersionRecord>> {
            let site = ledger
                .sites
                .get(name)
                .ok_or_else(|| FolioError::NotFound(format!("site '{name}'")))?;
            let versions: Vec<VersionRecord> = match &site.target {
                SiteTarget::Direct { .. } => site.versions.clone(),
                SiteTarget::Folder { account, path } => ledger
                    .histories
                    .get(account)
                    .map(|h| h.records())
                    .unwrap_or_default()
                    .iter()
                    .filter(|r| r.roster.iter().any(|p| p == path))
                    .enumerate()
                    .map(|(i, r)| VersionRecord {
                        version: i as u32 + 1,
                        snapshot: r.new_id.clone(),
                        time: r.time,
                        action: r.action.clone(),
                    })
                    .collect(),
            };
            Ok(tail(versions, limit))
        })
    }

    pub fn list_entries(&self, alias: &str, kind: EntryKind) -> Result<Vec<FolderEntry>> {
        self.read(|ledger| -> Result<Vec<FolderEntry>> {
            ledger.account(alias)?;
            Ok(ledger
                .directories
                .get(alias)
                .map(|d| d.list(kind).into_iter().cloned().collect())
                .unwrap_or_default())
        })
    }

    pub fn counts_by_kind(&self, alias: &str) -> Result<EntryCounts> {
        self.read(|ledger| -> Result<EntryCounts> {
            ledger.account(alias)?;
            Ok(ledger
                .directories
                .get(alias)
                .map(|d| d.counts())
                .unwrap_or_default())
        })
    }

    /// Sites owned by `alias`, with their version counts.
    pub fn list_sites(&self, alias: &str) -> Result<Vec<SiteSummary>> {
        self.read(|ledger| -> Result<Vec<SiteSummary>> {
            let account = ledger.account(alias)?;
            Ok(ledger
                .sites
                .owned_by(&account.id)
                .map(|site| SiteSummary {
                    name: site.name.clone(),
                    target: site.target.clone(),
                    created: site.created,
                    updated: site.updated,
                    versions: match &site.target {
                        SiteTarget::Direct { .. } => site.versions.len(),
                        SiteTarget::Folder { account, path } => ledger
                            .histories
                            .get(account)
                            .map_or(0, |h| {
                                h.records()
                                    .iter()
                                    .filter(|r| r.roster.iter().any(|p| p == path))
                                    .count()
                            }),
                    },
                })
                .collect())
        })
    }

    /// Folder history of `alias`, oldest first, capped by `history_limit`.
    pub fn folder_history(&self, alias: &str) -> Result<Vec<HistoryRecord>> {
        let limit = self.config.history_limit;
        self.read(|ledger| -> Result<Vec<HistoryRecord>> {
            ledger.account(alias)?;
            Ok(ledger
                .histories
                .get(alias)
                .map(|h| h.recent(limit).to_vec())
                .unwrap_or_default())
        })
    }

    pub fn stats(&self) -> Stats {
        self.read(|ledger| Stats {
            accounts: ledger.accounts.len(),
            folders: ledger
                .accounts
                .values()
                .filter(|a| a.current.is_some())
                .count(),
            sites: ledger.sites.len(),
            entries: ledger.directories.values().map(|d| d.len()).sum(),
            redirects: ledger.redirects.len(),
            snapshots: ledger.histories.values().map(|h| h.len()).sum(),
        })
    }

    /// Recursive listing of snapshot `id`, at most `max_depth` levels deep.
    pub async fn display_tree(&self, id: &SnapshotId, max_depth: usize) -> Result<TreeView> {
        let store = self.store.clone();
        let id = id.clone();
        call_store(self.config.store_timeout(), "list_children", move || {
            let mut root = TreeView {
                name: String::new(),
                id: id.clone(),
                kind: ChildKind::Directory,
                size: 0,
                children: Vec::new(),
                truncated: false,
            };
            expand(store.as_ref(), &mut root, max_depth)?;
            root.size = root.children.iter().map(|c| c.size).sum();
            Ok(root)
        })
        .await
    }

    /// Bytes of `path` inside site `name`; an empty path serves `index.html`.
    pub async fn fetch_site_file(&self, name: &str, path: &str) -> Result<Vec<u8>> {
        let location = self.locate_site(name)?;
        let path = if path.trim_matches('/').is_empty() {
            DEFAULT_DOCUMENT
        } else {
            path
        };
        if split_tree_path(path).is_none() {
            return Err(FolioError::InvalidRequest(format!("invalid path '{path}'")));
        }
        let full = match location.path() {
            "" => path.trim_start_matches('/').to_string(),
            root => format!("{root}/{}", path.trim_start_matches('/')),
        };

        let store = self.store.clone();
        let snapshot = location.snapshot().clone();
        call_store(self.config.store_timeout(), "read_file", move || {
            store.read_file(&snapshot, &full)
        })
        .await?
        .ok_or_else(|| FolioError::NotFound(format!("'{path}' in site '{name}'")))
    }
}

fn expand(store: &dyn ContentStore, node: &mut TreeView, depth: usize) -> Result<()> {
    if node.kind != ChildKind::Directory {
        return Ok(());
    }
    if depth == 0 {
        node.truncated = true;
        return Ok(());
    }
    for child in store.list_children(&node.id)? {
        let mut view = TreeView {
            name: child.name,
            id: child.id,
            kind: child.kind,
            size: child.size,
            children: Vec::new(),
            truncated: false,
        };
        expand(store, &mut view, depth - 1)?;
        node.children.push(view);
    }
    Ok(())
}

fn tail<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    if limit > 0 && items.len() > limit {
        items.drain(..items.len() - limit);
    }
    items
}
