use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use folio_types::error::{FolioError, Result};
use folio_types::SnapshotId;

use crate::folder::FolderDirectory;
use crate::history::HistoryLog;
use crate::quota::Quota;
use crate::redirect::RedirectTable;
use crate::site::SiteRegistry;

const STATE_FORMAT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub alias: String,
    pub id: String,
    pub quota: Quota,
    /// Size of the folder skeleton, included in `quota.used`.
    #[serde(default)]
    pub bootstrap_size: u64,
    /// Live folder snapshot. `None` until the folder is created.
    pub current: Option<SnapshotId>,
    pub created: DateTime<Utc>,
}

impl Account {
    pub fn new(alias: &str, quota_limit: u64, created: DateTime<Utc>) -> Self {
        Self {
            alias: alias.to_string(),
            id: format!("{:032x}", rand::random::<u128>()),
            quota: Quota::new(quota_limit),
            bootstrap_size: 0,
            current: None,
            created,
        }
    }
}

/// Everything the folder store persists, as one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub accounts: BTreeMap<String, Account>,
    #[serde(default)]
    pub directories: BTreeMap<String, FolderDirectory>,
    #[serde(default)]
    pub histories: BTreeMap<String, HistoryLog>,
    #[serde(default)]
    pub redirects: RedirectTable,
    #[serde(default)]
    pub sites: SiteRegistry,
}

#[derive(Serialize, Deserialize)]
struct StateFile {
    format: u32,
    #[serde(flatten)]
    ledger: Ledger,
}

impl Ledger {
    /// Load `path`, or an empty ledger if it does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no state file, starting empty");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let state: StateFile = serde_json::from_slice(&data)?;
        if state.format != STATE_FORMAT {
            return Err(FolioError::Config(format!(
                "unsupported state format {} in '{}'",
                state.format,
                path.display()
            )));
        }
        Ok(state.ledger)
    }

    /// Write atomically: temp file in the same directory, then rename.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_vec_pretty(&StateFileRef {
            format: STATE_FORMAT,
            ledger: self,
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn account(&self, alias: &str) -> Result<&Account> {
        self.accounts
            .get(alias)
            .ok_or_else(|| FolioError::NotFound(format!("account '{alias}'")))
    }

    pub fn account_mut(&mut self, alias: &str) -> Result<&mut Account> {
        self.accounts
            .get_mut(alias)
            .ok_or_else(|| FolioError::NotFound(format!("account '{alias}'")))
    }

    pub fn account_by_id(&self, id: &str) -> Option<&Account> {
        self.accounts.values().find(|a| a.id == id)
    }

    /// Live snapshot of `alias`, `NotFound` if the account or its folder is missing.
    pub fn current_of(&self, alias: &str) -> Result<SnapshotId> {
        self.account(alias)?
            .current
            .clone()
            .ok_or_else(|| FolioError::NotFound(format!("account '{alias}' has no folder")))
    }
}

#[derive(Serialize)]
struct StateFileRef<'a> {
    format: u32,
    #[serde(flatten)]
    ledger: &'a Ledger,
}

/// Aliases are path- and URL-safe handles: `[A-Za-z0-9._-]`, at most 128 bytes.
pub fn validate_alias(alias: &str) -> Result<()> {
    if alias.is_empty() || alias.len() > 128 {
        return Err(FolioError::InvalidRequest(format!(
            "alias must be 1-128 bytes, got {}",
            alias.len()
        )));
    }
    if alias == "." || alias == ".." {
        return Err(FolioError::InvalidRequest(format!("invalid alias '{alias}'")));
    }
    if !alias
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
    {
        return Err(FolioError::InvalidRequest(format!(
            "alias '{alias}' may only contain letters, digits, '.', '_' and '-'"
        )));
    }
    Ok(())
}
