//! Snapshot mutation engine.
//!
//! A mutation runs FETCHING -> APPLYING -> COMMITTING under the account lock.
//! Bookkeeping (quota, directory, history, redirects, site records) changes
//! only after the store has durably written the new tree, and all of it lands
//! in one persisted ledger swap.

pub(crate) mod apply;
pub mod edit;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use folio_types::error::{FolioError, Result};
use folio_types::SnapshotId;

use self::apply::ApplyContext;
use self::edit::{validate_file_set, Content, Edit, FileSet};
use crate::config::{FolioConfig, QuotaPolicy};
use crate::folder::skeleton::write_skeleton;
use crate::folder::{validate_entry_name, EntryKind, FolderDirectory, FolderEntry};
use crate::ledger::{validate_alias, Account, Ledger};
use crate::lock::{read_unpoisoned, write_unpoisoned, AccountLocks};
use crate::quota::{self, Quota};
use crate::site::SiteTarget;
use crate::store::{call_store, ContentStore};

const WORKSPACE_PREFIX: &str = "folio-ws-";

/// Scratch directory for one mutation. Store calls hold a clone, so a call
/// that outlives its timeout still owns the directory until it returns.
type Workspace = Arc<TempDir>;

/// Result of one committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    pub account: String,
    /// `None` for the bootstrap mutation.
    pub previous: Option<SnapshotId>,
    pub new: SnapshotId,
    pub quota_used: u64,
    pub seq: u64,
    /// In-tree path of the entry the edit touched, e.g. `websites/blog`.
    pub path: Option<String>,
}

/// Result of publishing or rolling back a standalone site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub name: String,
    pub previous: Option<SnapshotId>,
    pub snapshot: SnapshotId,
    pub version: u32,
}

/// The versioned folder store: every account's folder lineage plus the site map.
pub struct FolderStore {
    pub(crate) config: FolioConfig,
    pub(crate) store: Arc<dyn ContentStore>,
    pub(crate) ledger: Arc<RwLock<Ledger>>,
    /// Serializes clone -> persist -> swap of the ledger across accounts.
    commit_lock: Arc<Mutex<()>>,
    pub(crate) locks: AccountLocks,
}

/// Everything decided before any store I/O.
struct EditPlan {
    base: SnapshotId,
    owner_id: String,
    size: u64,
    released: u64,
    created: DateTime<Utc>,
    directory: FolderDirectory,
    removed: Vec<FolderEntry>,
}

impl FolderStore {
    /// Load persisted state and prepare the workspace root.
    pub fn open(config: FolioConfig, store: Arc<dyn ContentStore>) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let workspace_root = config.workspace_root();
        std::fs::create_dir_all(&workspace_root)?;
        clean_stale_workspaces(&workspace_root);

        let ledger = Ledger::load(&config.state_path())?;
        info!(
            accounts = ledger.accounts.len(),
            sites = ledger.sites.len(),
            data_dir = %config.data_dir.display(),
            "folder store opened"
        );
        Ok(Self {
            config,
            store,
            ledger: Arc::new(RwLock::new(ledger)),
            commit_lock: Arc::new(Mutex::new(())),
            locks: AccountLocks::new(),
        })
    }

    pub fn config(&self) -> &FolioConfig {
        &self.config
    }

    /// Create an account without a folder.
    pub async fn register_account(&self, alias: &str, quota_limit: u64) -> Result<Account> {
        validate_alias(alias)?;
        let _guard = self.locks.acquire(alias).await;
        let account = Account::new(alias, quota_limit, Utc::now());
        let account = self.commit(|ledger| {
            if ledger.accounts.contains_key(alias) {
                return Err(FolioError::AlreadyExists(format!("account '{alias}'")));
            }
            ledger.accounts.insert(alias.to_string(), account.clone());
            Ok(account)
        })
        .await?;
        info!(account = alias, limit = quota_limit, "account registered");
        Ok(account)
    }

    /// Apply one edit to `alias`'s folder and commit a new snapshot.
    pub async fn mutate(&self, alias: &str, edit: Edit) -> Result<MutationOutcome> {
        let label = edit.label();
        let result = self.mutate_locked(alias, edit).await;
        if let Err(e) = &result {
            warn!(account = alias, edit = label, error = %e, "mutation aborted");
        }
        result
    }

    /// [`FolderStore::mutate`] on behalf of `caller`, who must own the folder.
    pub async fn mutate_as(&self, caller: &str, alias: &str, edit: Edit) -> Result<MutationOutcome> {
        if caller != alias {
            warn!(caller, account = alias, edit = edit.label(), "mutation by non-owner rejected");
            return Err(FolioError::AccessDenied(format!(
                "'{caller}' may not modify the folder of '{alias}'"
            )));
        }
        self.mutate(alias, edit).await
    }

    async fn mutate_locked(&self, alias: &str, edit: Edit) -> Result<MutationOutcome> {
        let edit = edit.normalized();
        edit.validate()?;
        if edit == Edit::CreateFolder {
            return self.create_folder(alias).await;
        }

        self.read(|ledger| ledger.account(alias).map(|_| ()))?;
        let _guard = self.locks.acquire(alias).await;
        let now = Utc::now();
        let plan = self.read(|ledger| plan_edit(ledger, alias, &edit, self.config.quota_on_delete, now))?;

        debug!(account = alias, snapshot = %plan.base, edit = edit.label(), "fetching current tree");
        let workspace = self.workspace()?;
        let root = self.fetch(&plan.base, &workspace).await?;

        debug!(account = alias, edit = edit.label(), "applying edit");
        let ctx = ApplyContext {
            owner_id: &plan.owner_id,
            base: &plan.base,
            created: plan.created,
        };
        apply::apply_edit(&root, &edit, &ctx)?;
        apply::verify_entries(&root, &plan.directory, &plan.base)?;

        debug!(account = alias, "committing new tree");
        let new_id = self.put(&workspace, &root).await?;
        drop(workspace);

        let outcome = self
            .commit(|ledger| finish_edit(ledger, alias, &edit, plan, new_id, now))
            .await?;
        info!(
            account = alias,
            snapshot = %outcome.new,
            seq = outcome.seq,
            entry = outcome.path.as_deref().unwrap_or(""),
            quota_used = outcome.quota_used,
            "mutation committed"
        );
        Ok(outcome)
    }

    async fn create_folder(&self, alias: &str) -> Result<MutationOutcome> {
        validate_alias(alias)?;
        let _guard = self.locks.acquire(alias).await;
        let now = Utc::now();

        let account = match self.read(|ledger| ledger.accounts.get(alias).cloned()) {
            Some(account) if account.current.is_some() => {
                return Err(FolioError::AlreadyExists(format!(
                    "account '{alias}' already has a folder"
                )));
            }
            Some(account) => account,
            None => Account::new(alias, self.config.default_quota, now),
        };

        let workspace = self.workspace()?;
        let size = write_skeleton(workspace.path(), alias, &account.id, now)?;
        quota::check_and_reserve(&account.quota, size, 0)?;
        debug!(account = alias, bytes = size, "committing folder skeleton");
        let new_id = self.put(&workspace, workspace.path()).await?;
        drop(workspace);

        let outcome = self.commit(|ledger| {
            let account = ledger
                .accounts
                .entry(alias.to_string())
                .or_insert(account);
            account.current = Some(new_id.clone());
            account.bootstrap_size = size;
            account.quota.charge(size);
            let quota_used = account.quota.used;

            ledger
                .directories
                .insert(alias.to_string(), FolderDirectory::default());
            let history = ledger.histories.entry(alias.to_string()).or_default();
            let seq = history.append(new_id.clone(), None, "Created folder", Vec::new(), now);
            ledger.redirects.advance(history.lineage(), &new_id);

            Ok(MutationOutcome {
                account: alias.to_string(),
                previous: None,
                new: new_id,
                quota_used,
                seq,
                path: None,
            })
        })
        .await?;
        info!(account = alias, snapshot = %outcome.new, seq = outcome.seq, "folder created");
        Ok(outcome)
    }

    /// Fail with `QuotaExceeded` unless `bytes` more fit in `alias`'s quota.
    pub fn check_and_reserve(&self, alias: &str, bytes: u64) -> Result<()> {
        let quota = self.read(|ledger| ledger.account(alias).map(|a| a.quota))?;
        quota::check_and_reserve(&quota, bytes, 0)
    }

    /// Usage implied by the tracked entries, without touching the ledger.
    pub fn recompute(&self, alias: &str) -> Result<u64> {
        self.read(|ledger| -> Result<u64> {
            let account = ledger.account(alias)?;
            let directory = ledger.directories.get(alias).cloned().unwrap_or_default();
            Ok(quota::recompute(&directory, account.bootstrap_size))
        })
    }

    /// Correct `alias`'s usage if it drifted past the configured tolerance.
    pub async fn reconcile_quota(&self, alias: &str) -> Result<Quota> {
        self.read(|ledger| ledger.account(alias).map(|_| ()))?;
        let _guard = self.locks.acquire(alias).await;
        let (quota, recomputed) = self.read(|ledger| -> Result<(Quota, u64)> {
            let account = ledger.account(alias)?;
            let directory = ledger.directories.get(alias).cloned().unwrap_or_default();
            Ok((account.quota, quota::recompute(&directory, account.bootstrap_size)))
        })?;
        let Some(corrected) =
            quota::drift_correction(quota.used, recomputed, self.config.quota_drift_tolerance)
        else {
            return Ok(quota);
        };
        warn!(
            account = alias,
            used = quota.used,
            recomputed = corrected,
            "quota drift corrected"
        );
        self.commit(|ledger| {
            let account = ledger.account_mut(alias)?;
            account.quota.used = corrected;
            Ok(account.quota)
        })
        .await
    }

    /// Publish a standalone site snapshot under `name`, owned by `owner`.
    ///
    /// Not charged against the owner's folder quota.
    pub async fn publish_site(
        &self,
        owner: &str,
        name: &str,
        files: FileSet,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<PublishOutcome> {
        validate_entry_name(name)?;
        validate_file_set(&files)?;
        self.read(|ledger| ledger.account(owner).map(|_| ()))?;
        let _guard = self.locks.acquire(owner).await;
        let now = Utc::now();

        let (owner_id, created) = self.read(|ledger| -> Result<(String, DateTime<Utc>)> {
            let account = ledger.account(owner)?;
            ledger.sites.ensure_direct_publishable(name, &account.id)?;
            let created = ledger.sites.get(name).map_or(now, |s| s.created);
            Ok((account.id.clone(), created))
        })?;

        let workspace = self.workspace()?;
        apply::write_files(workspace.path(), &files)?;
        apply::write_meta(
            workspace.path(),
            metadata.unwrap_or_default(),
            &owner_id,
            created,
            "site",
        )?;
        let snapshot = self.put(&workspace, workspace.path()).await?;
        drop(workspace);

        let action = format!("Published {} files", files.len());
        let outcome = self.commit(|ledger| {
            let previous = match ledger.sites.get(name).map(|s| &s.target) {
                Some(SiteTarget::Direct { snapshot }) => Some(snapshot.clone()),
                _ => None,
            };
            let version =
                ledger
                    .sites
                    .publish_direct(name, &owner_id, owner, snapshot.clone(), action, now)?;
            Ok(PublishOutcome {
                name: name.to_string(),
                previous,
                snapshot,
                version,
            })
        })
        .await?;
        info!(
            account = owner,
            site = name,
            snapshot = %outcome.snapshot,
            version = outcome.version,
            "site published"
        );
        Ok(outcome)
    }

    /// Point a standalone site back at version `version` (1-based).
    pub async fn rollback_site(&self, caller: &str, name: &str, version: u32) -> Result<PublishOutcome> {
        let caller_id = self.read(|ledger| ledger.account(caller).map(|a| a.id.clone()))?;
        let _guard = self.locks.acquire(caller).await;
        let outcome = self.commit(|ledger| {
            let previous = match ledger.sites.get(name).map(|s| &s.target) {
                Some(SiteTarget::Direct { snapshot }) => Some(snapshot.clone()),
                _ => None,
            };
            let (snapshot, new_version) = ledger.sites.rollback(name, &caller_id, version, Utc::now())?;
            Ok(PublishOutcome {
                name: name.to_string(),
                previous,
                snapshot,
                version: new_version,
            })
        })
        .await?;
        info!(
            account = caller,
            site = name,
            snapshot = %outcome.snapshot,
            version = outcome.version,
            "site rolled back to version {version}"
        );
        Ok(outcome)
    }

    /// Write one file into a standalone site `caller` owns, as a new version.
    pub async fn update_site_file(
        &self,
        caller: &str,
        name: &str,
        path: &str,
        content: Content,
    ) -> Result<PublishOutcome> {
        let bytes = content.decode()?;
        self.edit_site_file(caller, name, path, Some(bytes)).await
    }

    /// Remove one file from a standalone site `caller` owns, as a new version.
    pub async fn delete_site_file(&self, caller: &str, name: &str, path: &str) -> Result<PublishOutcome> {
        self.edit_site_file(caller, name, path, None).await
    }

    async fn edit_site_file(
        &self,
        caller: &str,
        name: &str,
        path: &str,
        bytes: Option<Vec<u8>>,
    ) -> Result<PublishOutcome> {
        apply::site_file_parts(path)?;
        let caller_id = self.read(|ledger| ledger.account(caller).map(|a| a.id.clone()))?;
        let _guard = self.locks.acquire(caller).await;
        let base = self.read(|ledger| ledger.sites.owned_direct(name, &caller_id))?;

        let workspace = self.workspace()?;
        let root = self.fetch(&base, &workspace).await?;
        apply::apply_site_file(&root, path, bytes.as_deref(), &base)?;
        let snapshot = self.put(&workspace, &root).await?;
        drop(workspace);

        let verb = if bytes.is_some() { "Updated" } else { "Deleted" };
        let action = format!("{verb} file: {path}");
        let now = Utc::now();
        let outcome = self
            .commit(|ledger| {
                let version = ledger
                    .sites
                    .push_direct_version(name, &caller_id, snapshot.clone(), action, now)?;
                Ok(PublishOutcome {
                    name: name.to_string(),
                    previous: Some(base),
                    snapshot,
                    version,
                })
            })
            .await?;
        info!(
            account = caller,
            site = name,
            file = path,
            snapshot = %outcome.snapshot,
            version = outcome.version,
            "site file {}",
            verb.to_lowercase()
        );
        Ok(outcome)
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&Ledger) -> T) -> T {
        f(&*read_unpoisoned(&*self.ledger, "ledger"))
    }

    /// Apply `f` to a copy of the ledger, persist it, then make it live.
    /// An error from `f` or from persisting leaves both disk and memory as they were.
    ///
    /// Persisting and swapping run together on the blocking pool, holding the
    /// commit lock, so a dropped caller cannot leave disk ahead of memory.
    async fn commit<T>(&self, f: impl FnOnce(&mut Ledger) -> Result<T>) -> Result<T> {
        let commit = Arc::clone(&self.commit_lock).lock_owned().await;
        let mut next = self.read(Ledger::clone);
        let out = f(&mut next)?;

        let ledger = Arc::clone(&self.ledger);
        let path = self.config.state_path();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let _commit = commit;
            next.persist(&path)?;
            *write_unpoisoned(&*ledger, "ledger") = next;
            Ok(())
        })
        .await
        .map_err(|e| FolioError::Io(std::io::Error::other(format!("ledger commit task failed: {e}"))))??;
        Ok(out)
    }

    fn workspace(&self) -> Result<Workspace> {
        let root = self.config.workspace_root();
        std::fs::create_dir_all(&root)?;
        Ok(Arc::new(
            tempfile::Builder::new()
                .prefix(WORKSPACE_PREFIX)
                .tempdir_in(root)?,
        ))
    }

    async fn fetch(&self, id: &SnapshotId, workspace: &Workspace) -> Result<PathBuf> {
        let store = self.store.clone();
        let id = id.clone();
        let workspace = Arc::clone(workspace);
        call_store(self.config.store_timeout(), "get_tree", move || {
            store.get_tree(&id, workspace.path())
        })
        .await
    }

    async fn put(&self, workspace: &Workspace, root: &Path) -> Result<SnapshotId> {
        let store = self.store.clone();
        let workspace = Arc::clone(workspace);
        let root = root.to_path_buf();
        call_store(self.config.store_timeout(), "put_tree", move || {
            let id = store.put_tree(&root);
            drop(workspace);
            id
        })
        .await
    }
}

fn plan_edit(
    ledger: &Ledger,
    alias: &str,
    edit: &Edit,
    policy: QuotaPolicy,
    now: DateTime<Utc>,
) -> Result<EditPlan> {
    let account = ledger.account(alias)?;
    let base = ledger.current_of(alias)?;
    let mut directory = ledger.directories.get(alias).cloned().unwrap_or_default();
    let size = edit.estimated_size()?;

    let mut created = now;
    let mut removed = Vec::new();
    match edit {
        Edit::PutWebsite { name, files, metadata } => {
            ledger
                .sites
                .ensure_claimable(name, &account.id, Some(&EntryKind::Website.entry_path(name)))?;
            created = entry_created(&directory, EntryKind::Website, name, now);
            removed.extend(directory.add_entry(FolderEntry {
                name: name.clone(),
                kind: EntryKind::Website,
                size,
                created,
                updated: now,
                files: files.keys().cloned().collect(),
                archive_name: None,
                metadata: metadata.clone(),
            }));
        }
        Edit::PutArchiveWebsite {
            name,
            archive_name,
            files,
        } => {
            ledger.sites.ensure_claimable(
                name,
                &account.id,
                Some(&EntryKind::ArchiveWebsite.entry_path(name)),
            )?;
            created = entry_created(&directory, EntryKind::ArchiveWebsite, name, now);
            removed.extend(directory.add_entry(FolderEntry {
                name: name.clone(),
                kind: EntryKind::ArchiveWebsite,
                size,
                created,
                updated: now,
                files: files.keys().cloned().collect(),
                archive_name: Some(archive_name.clone()),
                metadata: None,
            }));
        }
        Edit::PutFile { name, .. } => {
            created = entry_created(&directory, EntryKind::File, name, now);
            removed.extend(directory.add_entry(FolderEntry {
                name: name.clone(),
                kind: EntryKind::File,
                size,
                created,
                updated: now,
                files: Vec::new(),
                archive_name: None,
                metadata: None,
            }));
        }
        Edit::DeleteEntry { kind, name } => {
            let entry = directory.remove_entry(*kind, name).ok_or_else(|| {
                FolioError::NotFound(format!("entry '{}' of account '{alias}'", kind.entry_path(name)))
            })?;
            removed.push(entry);
        }
        Edit::DeleteAll => removed = directory.clear(),
        Edit::CreateFolder => {
            return Err(FolioError::AlreadyExists(format!(
                "account '{alias}' already has a folder"
            )))
        }
    }

    let released = match policy {
        QuotaPolicy::Retain => 0,
        QuotaPolicy::Release => removed.iter().map(|e| e.size).sum(),
    };
    if edit.is_add() {
        quota::check_and_reserve(&account.quota, size, released)?;
    }

    Ok(EditPlan {
        base,
        owner_id: account.id.clone(),
        size,
        released,
        created,
        directory,
        removed,
    })
}

fn entry_created(directory: &FolderDirectory, kind: EntryKind, name: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    directory.get(kind, name).map_or(now, |e| e.created)
}

fn action_for(edit: &Edit, replaced: bool) -> String {
    let verb = if replaced { "Updated" } else { "Added" };
    match edit {
        Edit::CreateFolder => "Created folder".to_string(),
        Edit::PutWebsite { name, files, .. } => {
            format!("{verb} website: {name} ({} files)", files.len())
        }
        Edit::PutArchiveWebsite {
            name, archive_name, ..
        } => format!("{verb} archive website: {name} from {archive_name}"),
        Edit::PutFile { name, .. } => format!("{verb} file: {name}"),
        Edit::DeleteEntry { kind, name } => format!("Deleted {}: {name}", kind.as_str()),
        Edit::DeleteAll => "Deleted all entries".to_string(),
    }
}

fn finish_edit(
    ledger: &mut Ledger,
    alias: &str,
    edit: &Edit,
    plan: EditPlan,
    new_id: SnapshotId,
    now: DateTime<Utc>,
) -> Result<MutationOutcome> {
    let account = ledger.account_mut(alias)?;
    let previous = account.current.replace(new_id.clone());
    account.quota.release(plan.released);
    account.quota.charge(plan.size);
    let quota_used = account.quota.used;
    let account_id = account.id.clone();

    match edit {
        Edit::PutWebsite { name, .. } | Edit::PutArchiveWebsite { name, .. } => {
            let kind = if matches!(edit, Edit::PutWebsite { .. }) {
                EntryKind::Website
            } else {
                EntryKind::ArchiveWebsite
            };
            ledger
                .sites
                .upsert_folder_site(name, &account_id, alias, kind.entry_path(name), now)?;
        }
        Edit::DeleteEntry { .. } | Edit::DeleteAll => {
            for entry in plan.removed.iter().filter(|e| e.kind.is_website()) {
                ledger.sites.remove_folder_site(&entry.name, alias, &entry.path(), now);
            }
        }
        Edit::PutFile { .. } | Edit::CreateFolder => {}
    }

    let replaced = edit.is_add() && !plan.removed.is_empty();
    let roster = plan.directory.roster();
    ledger.directories.insert(alias.to_string(), plan.directory);

    let history = ledger.histories.entry(alias.to_string()).or_default();
    let seq = history.append(new_id.clone(), previous.clone(), action_for(edit, replaced), roster, now);
    ledger.redirects.advance(history.lineage(), &new_id);

    Ok(MutationOutcome {
        account: alias.to_string(),
        previous,
        new: new_id,
        quota_used,
        seq,
        path: edit.target().map(|(kind, name)| kind.entry_path(name)),
    })
}

/// Remove workspaces left behind by a previous process.
fn clean_stale_workspaces(root: &Path) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with(WORKSPACE_PREFIX) {
            if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                warn!(path = %entry.path().display(), error = %e, "failed to remove stale workspace");
            }
        }
    }
}
