use std::collections::BTreeMap;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use folio_types::error::{FolioError, Result};

use crate::folder::{validate_entry_name, EntryKind};
use crate::store::split_tree_path;

/// File body as submitted: UTF-8 text, or base64 for binary content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Base64 { base64: String },
}

impl Content {
    pub fn text(s: impl Into<String>) -> Self {
        Content::Text(s.into())
    }

    pub fn base64(s: impl Into<String>) -> Self {
        Content::Base64 { base64: s.into() }
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        match self {
            Content::Text(s) => Ok(s.as_bytes().to_vec()),
            Content::Base64 { base64 } => base64::engine::general_purpose::STANDARD
                .decode(base64)
                .map_err(|e| FolioError::InvalidRequest(format!("invalid base64 content: {e}"))),
        }
    }

    /// Byte length after decoding.
    pub fn size(&self) -> Result<u64> {
        match self {
            Content::Text(s) => Ok(s.len() as u64),
            Content::Base64 { .. } => Ok(self.decode()?.len() as u64),
        }
    }
}

/// Relative path -> content.
pub type FileSet = BTreeMap<String, Content>;

/// One logical change to an account's folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "edit", rename_all = "kebab-case")]
pub enum Edit {
    CreateFolder,
    PutWebsite {
        name: String,
        files: FileSet,
        #[serde(default)]
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    },
    PutArchiveWebsite {
        name: String,
        /// Original archive file name.
        archive_name: String,
        /// Already-extracted archive members.
        files: FileSet,
    },
    PutFile {
        name: String,
        content: Content,
    },
    DeleteEntry {
        kind: EntryKind,
        name: String,
    },
    DeleteAll,
}

impl Edit {
    pub fn label(&self) -> &'static str {
        match self {
            Edit::CreateFolder => "create-folder",
            Edit::PutWebsite { .. } => "put-website",
            Edit::PutArchiveWebsite { .. } => "put-archive-website",
            Edit::PutFile { .. } => "put-file",
            Edit::DeleteEntry { .. } => "delete-entry",
            Edit::DeleteAll => "delete-all",
        }
    }

    /// Kind and name of the entry this edit targets, if any.
    pub fn target(&self) -> Option<(EntryKind, &str)> {
        match self {
            Edit::PutWebsite { name, .. } => Some((EntryKind::Website, name)),
            Edit::PutArchiveWebsite { name, .. } => Some((EntryKind::ArchiveWebsite, name)),
            Edit::PutFile { name, .. } => Some((EntryKind::File, name)),
            Edit::DeleteEntry { kind, name } => Some((*kind, name)),
            Edit::CreateFolder | Edit::DeleteAll => None,
        }
    }

    pub fn is_add(&self) -> bool {
        matches!(
            self,
            Edit::PutWebsite { .. } | Edit::PutArchiveWebsite { .. } | Edit::PutFile { .. }
        )
    }

    /// Bytes this edit adds: every file composing it, after decoding.
    pub fn estimated_size(&self) -> Result<u64> {
        match self {
            Edit::PutWebsite { files, .. } | Edit::PutArchiveWebsite { files, .. } => {
                files.values().try_fold(0u64, |acc, c| -> Result<u64> {
                    Ok(acc.saturating_add(c.size()?))
                })
            }
            Edit::PutFile { content, .. } => content.size(),
            Edit::CreateFolder | Edit::DeleteEntry { .. } | Edit::DeleteAll => Ok(0),
        }
    }

    /// Archive members get hidden files and a single wrapping directory removed.
    pub fn normalized(self) -> Self {
        match self {
            Edit::PutArchiveWebsite {
                name,
                archive_name,
                files,
            } => Edit::PutArchiveWebsite {
                name,
                archive_name,
                files: normalize_archive(files),
            },
            other => other,
        }
    }

    /// Local checks that need no store access.
    pub fn validate(&self) -> Result<()> {
        if let Some((_, name)) = self.target() {
            validate_entry_name(name)?;
        }
        match self {
            Edit::PutWebsite { files, .. } | Edit::PutArchiveWebsite { files, .. } => {
                validate_file_set(files)
            }
            _ => Ok(()),
        }
    }
}

/// A website file set: non-empty, every path relative and inside the site.
pub fn validate_file_set(files: &FileSet) -> Result<()> {
    if files.is_empty() {
        return Err(FolioError::InvalidRequest(
            "website needs at least one file".into(),
        ));
    }
    for path in files.keys() {
        if split_tree_path(path).map_or(true, |p| p.is_empty()) {
            return Err(FolioError::InvalidRequest(format!(
                "invalid file path '{path}'"
            )));
        }
    }
    Ok(())
}

/// Drop hidden and `__MACOSX` members, then strip one wrapping root directory
/// if every remaining member lives under the same top-level directory.
pub fn normalize_archive(files: FileSet) -> FileSet {
    let kept: FileSet = files
        .into_iter()
        .filter(|(path, _)| {
            path.split('/')
                .filter(|seg| !seg.is_empty())
                .all(|seg| !seg.starts_with('.') && !seg.starts_with("__MACOSX"))
        })
        .collect();

    let mut roots = kept.keys().map(|p| {
        let trimmed = p.trim_start_matches('/');
        trimmed.split_once('/').map(|(root, _)| root)
    });
    let Some(Some(first)) = roots.next() else {
        return kept;
    };
    if !roots.all(|r| r == Some(first)) {
        return kept;
    }
    let prefix = format!("{first}/");
    kept.into_iter()
        .map(|(path, content)| {
            let stripped = path
                .trim_start_matches('/')
                .strip_prefix(&prefix)
                .unwrap_or(&path)
                .to_string();
            (stripped, content)
        })
        .collect()
}
