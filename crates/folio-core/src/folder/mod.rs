pub mod skeleton;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use folio_types::error::{FolioError, Result};

/// Kind-namespace of a folder entry. Names are unique per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Website built from a caller-supplied file set.
    Website,
    /// Website built from an extracted archive.
    ArchiveWebsite,
    File,
}

impl EntryKind {
    pub const ALL: [EntryKind; 3] = [EntryKind::Website, EntryKind::ArchiveWebsite, EntryKind::File];

    /// Top-level directory of the folder tree holding entries of this kind.
    pub fn dir_name(&self) -> &'static str {
        match self {
            EntryKind::Website => "websites",
            EntryKind::ArchiveWebsite => "zip-websites",
            EntryKind::File => "files",
        }
    }

    pub fn is_website(&self) -> bool {
        matches!(self, EntryKind::Website | EntryKind::ArchiveWebsite)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Website => "website",
            EntryKind::ArchiveWebsite => "archive_website",
            EntryKind::File => "file",
        }
    }

    /// In-tree path of entry `name`, e.g. `websites/blog`.
    pub fn entry_path(&self, name: &str) -> String {
        format!("{}/{}", self.dir_name(), name)
    }
}

impl std::str::FromStr for EntryKind {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "website" | "websites" => Ok(EntryKind::Website),
            "archive_website" | "zip-websites" | "zip_website" => Ok(EntryKind::ArchiveWebsite),
            "file" | "files" => Ok(EntryKind::File),
            other => Err(FolioError::InvalidRequest(format!(
                "unknown entry kind '{other}'"
            ))),
        }
    }
}

/// One published item inside an account's folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Estimated size in bytes, as charged against the quota.
    pub size: u64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Relative paths of the files composing a website entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Original archive file name, archive websites only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl FolderEntry {
    pub fn path(&self) -> String {
        self.kind.entry_path(&self.name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryCounts {
    pub websites: usize,
    pub archive_websites: usize,
    pub files: usize,
}

impl EntryCounts {
    pub fn total(&self) -> usize {
        self.websites + self.archive_websites + self.files
    }
}

/// Per-account index of what currently exists in the folder, keyed by kind then name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderDirectory {
    #[serde(default)]
    files: BTreeMap<String, FolderEntry>,
    #[serde(default)]
    websites: BTreeMap<String, FolderEntry>,
    #[serde(default)]
    archive_websites: BTreeMap<String, FolderEntry>,
}

impl FolderDirectory {
    fn map(&self, kind: EntryKind) -> &BTreeMap<String, FolderEntry> {
        match kind {
            EntryKind::Website => &self.websites,
            EntryKind::ArchiveWebsite => &self.archive_websites,
            EntryKind::File => &self.files,
        }
    }

    fn map_mut(&mut self, kind: EntryKind) -> &mut BTreeMap<String, FolderEntry> {
        match kind {
            EntryKind::Website => &mut self.websites,
            EntryKind::ArchiveWebsite => &mut self.archive_websites,
            EntryKind::File => &mut self.files,
        }
    }

    pub fn get(&self, kind: EntryKind, name: &str) -> Option<&FolderEntry> {
        self.map(kind).get(name)
    }

    /// Insert or replace an entry, returning the one it replaced.
    pub fn add_entry(&mut self, entry: FolderEntry) -> Option<FolderEntry> {
        self.map_mut(entry.kind).insert(entry.name.clone(), entry)
    }

    pub fn remove_entry(&mut self, kind: EntryKind, name: &str) -> Option<FolderEntry> {
        self.map_mut(kind).remove(name)
    }

    /// Remove every entry, returning what was removed.
    pub fn clear(&mut self) -> Vec<FolderEntry> {
        let mut removed = Vec::with_capacity(self.len());
        for kind in EntryKind::ALL {
            removed.extend(std::mem::take(self.map_mut(kind)).into_values());
        }
        removed
    }

    pub fn list(&self, kind: EntryKind) -> Vec<&FolderEntry> {
        self.map(kind).values().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FolderEntry> {
        EntryKind::ALL
            .into_iter()
            .flat_map(move |kind| self.map(kind).values())
    }

    pub fn counts(&self) -> EntryCounts {
        EntryCounts {
            websites: self.websites.len(),
            archive_websites: self.archive_websites.len(),
            files: self.files.len(),
        }
    }

    /// In-tree paths of every entry, in kind then name order.
    pub fn roster(&self) -> Vec<String> {
        self.iter().map(FolderEntry::path).collect()
    }

    pub fn total_size(&self) -> u64 {
        self.iter().map(|e| e.size).sum()
    }

    pub fn len(&self) -> usize {
        self.counts().total()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validate an entry or site name: one path component, no traversal.
pub fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 255 {
        return Err(FolioError::InvalidRequest(format!(
            "entry name must be 1-255 bytes, got {}",
            name.len()
        )));
    }
    if name == "." || name == ".." {
        return Err(FolioError::InvalidRequest(format!("invalid entry name '{name}'")));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(FolioError::InvalidRequest(format!(
            "entry name '{name}' must not contain path separators"
        )));
    }
    Ok(())
}
