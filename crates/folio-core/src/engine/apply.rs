//! Local, synchronous half of a mutation: edit the fetched working copy.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use folio_types::error::{FolioError, Result};
use folio_types::SnapshotId;

use super::edit::{Edit, FileSet};
use crate::folder::{EntryKind, FolderDirectory};
use crate::store::split_tree_path;

pub const ENTRY_META_FILE: &str = "meta.json";

pub(crate) struct ApplyContext<'a> {
    pub owner_id: &'a str,
    pub base: &'a SnapshotId,
    /// Creation time recorded for the target entry (kept across replacements).
    pub created: DateTime<Utc>,
}

pub(crate) fn apply_edit(root: &Path, edit: &Edit, ctx: &ApplyContext<'_>) -> Result<()> {
    match edit {
        Edit::CreateFolder => Err(FolioError::InvalidRequest(
            "create-folder cannot be applied to an existing folder".into(),
        )),
        Edit::PutWebsite {
            name,
            files,
            metadata,
        } => {
            let dir = replace_entry_dir(root, EntryKind::Website, name, ctx.base)?;
            write_files(&dir, files)?;
            let meta = metadata.clone().unwrap_or_default();
            write_meta(&dir, meta, ctx.owner_id, ctx.created, "website")
        }
        Edit::PutArchiveWebsite {
            name,
            archive_name,
            files,
        } => {
            let dir = replace_entry_dir(root, EntryKind::ArchiveWebsite, name, ctx.base)?;
            write_files(&dir, files)?;
            let mut meta = Map::new();
            meta.insert("archive_name".into(), Value::String(archive_name.clone()));
            meta.insert("file_count".into(), Value::from(files.len()));
            write_meta(&dir, meta, ctx.owner_id, ctx.created, "archive_website")
        }
        Edit::PutFile { name, content } => {
            let path = require_kind_dir(root, EntryKind::File, ctx.base)?.join(name);
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            }
            fs::write(&path, content.decode()?)?;
            Ok(())
        }
        Edit::DeleteEntry { kind, name } => {
            let path = require_kind_dir(root, *kind, ctx.base)?.join(name);
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else if path.exists() {
                fs::remove_file(&path)?;
            } else {
                warn!(
                    snapshot = %ctx.base,
                    entry = %kind.entry_path(name),
                    "entry already absent from snapshot"
                );
            }
            Ok(())
        }
        Edit::DeleteAll => {
            for kind in EntryKind::ALL {
                let dir = require_kind_dir(root, kind, ctx.base)?;
                fs::remove_dir_all(&dir)?;
                fs::create_dir(&dir)?;
            }
            Ok(())
        }
    }
}

/// Every tracked entry must still be present after the rewrite.
pub(crate) fn verify_entries(root: &Path, directory: &FolderDirectory, base: &SnapshotId) -> Result<()> {
    for entry in directory.iter() {
        if !root.join(entry.kind.dir_name()).join(&entry.name).exists() {
            return Err(FolioError::Corrupt(format!(
                "entry '{}' missing from working copy of {base}",
                entry.path()
            )));
        }
    }
    Ok(())
}

fn require_kind_dir(root: &Path, kind: EntryKind, base: &SnapshotId) -> Result<PathBuf> {
    let dir = root.join(kind.dir_name());
    if !dir.is_dir() {
        return Err(FolioError::Corrupt(format!(
            "'{}' sub-tree missing from snapshot {base}",
            kind.dir_name()
        )));
    }
    Ok(dir)
}

fn replace_entry_dir(root: &Path, kind: EntryKind, name: &str, base: &SnapshotId) -> Result<PathBuf> {
    let dir = require_kind_dir(root, kind, base)?.join(name);
    if dir.is_dir() {
        fs::remove_dir_all(&dir)?;
    } else if dir.exists() {
        fs::remove_file(&dir)?;
    }
    fs::create_dir(&dir)?;
    Ok(dir)
}

pub(crate) fn write_files(dir: &Path, files: &FileSet) -> Result<()> {
    for (rel, content) in files {
        let parts = split_tree_path(rel)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| FolioError::InvalidRequest(format!("invalid file path '{rel}'")))?;
        let mut path = dir.to_path_buf();
        path.extend(parts);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content.decode()?)?;
    }
    Ok(())
}

/// Write (`Some`) or remove (`None`) one file of a standalone site's working copy.
pub(crate) fn apply_site_file(root: &Path, rel: &str, bytes: Option<&[u8]>, base: &SnapshotId) -> Result<()> {
    let mut path = root.to_path_buf();
    path.extend(site_file_parts(rel)?);
    match bytes {
        Some(bytes) => {
            if path.is_dir() {
                return Err(FolioError::InvalidRequest(format!(
                    "'{rel}' is a directory in site snapshot {base}"
                )));
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, bytes)?;
        }
        None => {
            if !path.is_file() {
                return Err(FolioError::NotFound(format!("file '{rel}' in site snapshot {base}")));
            }
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Components of a site-relative file path. The root `meta.json` is store-managed.
pub(crate) fn site_file_parts(rel: &str) -> Result<Vec<&str>> {
    let parts = split_tree_path(rel)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| FolioError::InvalidRequest(format!("invalid file path '{rel}'")))?;
    if parts == [ENTRY_META_FILE] {
        return Err(FolioError::InvalidRequest(format!(
            "'{ENTRY_META_FILE}' is maintained by the store"
        )));
    }
    Ok(parts)
}

/// `meta.json`: caller metadata plus owner, creation time and type.
pub(crate) fn write_meta(
    dir: &Path,
    mut meta: Map<String, Value>,
    owner_id: &str,
    created: DateTime<Utc>,
    entry_type: &str,
) -> Result<()> {
    meta.insert("owner".into(), Value::String(owner_id.to_string()));
    meta.insert("created".into(), Value::String(created.to_rfc3339()));
    meta.insert("type".into(), Value::String(entry_type.to_string()));
    fs::write(dir.join(ENTRY_META_FILE), serde_json::to_vec_pretty(&meta)?)?;
    Ok(())
}
