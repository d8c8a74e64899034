use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use folio_types::error::{FolioError, Result};

/// Quota applied to accounts bootstrapped without explicit registration.
pub const DEFAULT_QUOTA_BYTES: u64 = 100 * 1024 * 1024;

/// What happens to an account's quota usage when an entry is deleted or replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPolicy {
    /// Usage only ever grows; removed entries keep counting.
    #[default]
    Retain,
    /// Removed or replaced entries give their bytes back.
    Release,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolioConfig {
    /// Directory holding `state.json`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Root for transient mutation workspaces. Default: `<data_dir>/tmp`.
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,

    /// Quota limit in bytes for accounts created by `create-folder`.
    #[serde(
        default = "default_quota",
        deserialize_with = "deserialize_size"
    )]
    pub default_quota: u64,

    /// Upper bound on a single content store call, in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Recomputed usage may differ from the ledger by this much before it is corrected.
    #[serde(default = "default_drift_tolerance")]
    pub quota_drift_tolerance: u64,

    #[serde(default)]
    pub quota_on_delete: QuotaPolicy,

    /// Maximum number of records returned by history listings. 0 = all.
    #[serde(default)]
    pub history_limit: usize,
}

impl Default for FolioConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            workspace_dir: None,
            default_quota: default_quota(),
            store_timeout_ms: default_store_timeout_ms(),
            quota_drift_tolerance: default_drift_tolerance(),
            quota_on_delete: QuotaPolicy::default(),
            history_limit: 0,
        }
    }
}

impl FolioConfig {
    /// Config rooted at `data_dir`, everything else defaulted.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("tmp"))
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms.max(1))
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/folio")
}

fn default_quota() -> u64 {
    DEFAULT_QUOTA_BYTES
}

fn default_store_timeout_ms() -> u64 {
    30_000
}

fn default_drift_tolerance() -> u64 {
    1024
}

/// Load a YAML config file. Missing fields take their defaults.
pub fn load_config(path: &Path) -> Result<FolioConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        FolioError::Config(format!("cannot read '{}': {e}", path.display()))
    })?;
    serde_yaml::from_str(&text)
        .map_err(|e| FolioError::Config(format!("invalid config '{}': {e}", path.display())))
}

/// Parse a human size such as `"500M"`, `"10G"`, `"1.5k"` or plain bytes.
pub fn parse_size(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size".into());
    }
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid size '{s}'"))?;
    let multiplier: u64 = match suffix.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        "T" | "TB" | "TIB" => 1024 * 1024 * 1024 * 1024,
        other => return Err(format!("unknown size suffix '{other}'")),
    };
    Ok((value * multiplier as f64).round() as u64)
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeInput {
        Bytes(u64),
        Human(String),
    }

    match SizeInput::deserialize(deserializer)? {
        SizeInput::Bytes(n) => Ok(n),
        SizeInput::Human(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}
