use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use folio_types::error::{FolioError, Result};
use folio_types::SnapshotId;

/// Where a public site name points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SiteTarget {
    /// Standalone snapshot, not backed by a folder.
    Direct { snapshot: SnapshotId },
    /// Path inside an account's current folder snapshot.
    Folder { account: String, path: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: u32,
    pub snapshot: SnapshotId,
    pub time: DateTime<Utc>,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub name: String,
    pub owner_id: String,
    pub owner_alias: String,
    pub target: SiteTarget,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Linear version chain of a direct site. Kept when the name moves into a folder.
    #[serde(default)]
    pub versions: Vec<VersionRecord>,
}

impl SiteRecord {
    pub fn is_folder_backed(&self) -> bool {
        matches!(self.target, SiteTarget::Folder { .. })
    }
}

/// Global map of site names. Names are unique across all accounts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteRegistry {
    sites: BTreeMap<String, SiteRecord>,
}

impl SiteRegistry {
    pub fn get(&self, name: &str) -> Option<&SiteRecord> {
        self.sites.get(name)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn owned_by<'a>(&'a self, owner_id: &'a str) -> impl Iterator<Item = &'a SiteRecord> {
        self.sites.values().filter(move |s| s.owner_id == owner_id)
    }

    /// Fail unless `name` is free or already owned by `owner_id`.
    ///
    /// `folder_path` is the folder entry that wants the name; a site of the
    /// same owner pointing at a different folder entry also conflicts.
    pub fn ensure_claimable(
        &self,
        name: &str,
        owner_id: &str,
        folder_path: Option<&str>,
    ) -> Result<()> {
        let Some(existing) = self.sites.get(name) else {
            return Ok(());
        };
        if existing.owner_id != owner_id {
            return Err(FolioError::AlreadyExists(format!(
                "site name '{name}' is taken by another account"
            )));
        }
        if let (Some(wanted), SiteTarget::Folder { path, .. }) = (folder_path, &existing.target) {
            if path != wanted {
                return Err(FolioError::AlreadyExists(format!(
                    "site name '{name}' already points at '{path}'"
                )));
            }
        }
        Ok(())
    }

    /// Point `name` at a folder entry, creating the record if needed.
    pub fn upsert_folder_site(
        &mut self,
        name: &str,
        owner_id: &str,
        owner_alias: &str,
        path: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_claimable(name, owner_id, Some(&path))?;
        let target = SiteTarget::Folder {
            account: owner_alias.to_string(),
            path,
        };
        self.sites
            .entry(name.to_string())
            .and_modify(|site| {
                site.target = target.clone();
                site.updated = now;
            })
            .or_insert_with(|| SiteRecord {
                name: name.to_string(),
                owner_id: owner_id.to_string(),
                owner_alias: owner_alias.to_string(),
                target,
                created: now,
                updated: now,
                versions: Vec::new(),
            });
        Ok(())
    }

    /// Release a folder-backed site that points into `account` at `path`.
    ///
    /// A name that was a standalone site before moving into the folder falls
    /// back to its last standalone version; otherwise the record is dropped.
    /// Returns the target the name points at afterwards, if any.
    pub fn remove_folder_site(
        &mut self,
        name: &str,
        account: &str,
        path: &str,
        now: DateTime<Utc>,
    ) -> Option<SiteTarget> {
        let site = self.sites.get_mut(name)?;
        if !matches!(&site.target, SiteTarget::Folder { account: a, path: p } if a == account && p == path) {
            return Some(site.target.clone());
        }
        match site.versions.last().map(|v| v.snapshot.clone()) {
            Some(snapshot) => {
                site.target = SiteTarget::Direct { snapshot };
                site.updated = now;
                Some(site.target.clone())
            }
            None => {
                self.sites.remove(name);
                None
            }
        }
    }

    /// Fail unless `owner_id` may publish a standalone snapshot under `name`.
    pub fn ensure_direct_publishable(&self, name: &str, owner_id: &str) -> Result<()> {
        self.ensure_claimable(name, owner_id, None)?;
        if matches!(self.sites.get(name), Some(s) if s.is_folder_backed()) {
            return Err(FolioError::AlreadyExists(format!(
                "site '{name}' is served from a folder; update the folder entry instead"
            )));
        }
        Ok(())
    }

    /// Point `name` at a standalone snapshot and append a version. Returns the version number.
    pub fn publish_direct(
        &mut self,
        name: &str,
        owner_id: &str,
        owner_alias: &str,
        snapshot: SnapshotId,
        action: String,
        now: DateTime<Utc>,
    ) -> Result<u32> {
        self.ensure_direct_publishable(name, owner_id)?;
        let site = self
            .sites
            .entry(name.to_string())
            .or_insert_with(|| SiteRecord {
                name: name.to_string(),
                owner_id: owner_id.to_string(),
                owner_alias: owner_alias.to_string(),
                target: SiteTarget::Direct {
                    snapshot: snapshot.clone(),
                },
                created: now,
                updated: now,
                versions: Vec::new(),
            });
        Ok(push_version(site, snapshot, action, now))
    }

    /// Current snapshot of the standalone site `name`, which `caller_id` must own.
    pub fn owned_direct(&self, name: &str, caller_id: &str) -> Result<SnapshotId> {
        let site = self
            .sites
            .get(name)
            .ok_or_else(|| FolioError::NotFound(format!("site '{name}'")))?;
        check_owned_direct(site, caller_id)?;
        match &site.target {
            SiteTarget::Direct { snapshot } => Ok(snapshot.clone()),
            SiteTarget::Folder { path, .. } => Err(FolioError::InvalidRequest(format!(
                "site '{name}' is served from '{path}'"
            ))),
        }
    }

    /// Point the standalone site `name` at `snapshot` and append a version.
    pub fn push_direct_version(
        &mut self,
        name: &str,
        caller_id: &str,
        snapshot: SnapshotId,
        action: String,
        now: DateTime<Utc>,
    ) -> Result<u32> {
        let site = self.owned_direct_mut(name, caller_id)?;
        Ok(push_version(site, snapshot, action, now))
    }

    /// Re-point a direct site at the snapshot of `version` (1-based).
    pub fn rollback(
        &mut self,
        name: &str,
        caller_id: &str,
        version: u32,
        now: DateTime<Utc>,
    ) -> Result<(SnapshotId, u32)> {
        let site = self.owned_direct_mut(name, caller_id)?;
        let index = (version as usize)
            .checked_sub(1)
            .filter(|i| *i < site.versions.len())
            .ok_or_else(|| {
                FolioError::InvalidRequest(format!(
                    "invalid version {version}, site '{name}' has {} versions",
                    site.versions.len()
                ))
            })?;
        let snapshot = site.versions[index].snapshot.clone();
        let new_version = push_version(
            site,
            snapshot.clone(),
            format!("Rolled back to version {version}"),
            now,
        );
        Ok((snapshot, new_version))
    }

    fn owned_direct_mut(&mut self, name: &str, caller_id: &str) -> Result<&mut SiteRecord> {
        let site = self
            .sites
            .get_mut(name)
            .ok_or_else(|| FolioError::NotFound(format!("site '{name}'")))?;
        check_owned_direct(site, caller_id)?;
        Ok(site)
    }
}

fn check_owned_direct(site: &SiteRecord, caller_id: &str) -> Result<()> {
    if site.owner_id != caller_id {
        return Err(FolioError::AccessDenied(format!(
            "site '{}' belongs to another account",
            site.name
        )));
    }
    if site.is_folder_backed() {
        return Err(FolioError::InvalidRequest(format!(
            "site '{}' is folder-backed and has no standalone versions",
            site.name
        )));
    }
    Ok(())
}

fn push_version(site: &mut SiteRecord, snapshot: SnapshotId, action: String, now: DateTime<Utc>) -> u32 {
    let version = site.versions.len() as u32 + 1;
    site.target = SiteTarget::Direct {
        snapshot: snapshot.clone(),
    };
    site.updated = now;
    site.versions.push(VersionRecord {
        version,
        snapshot,
        time: now,
        action,
    });
    version
}
