use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use folio_core::config::load_config;
use folio_core::{FolioConfig, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Address to listen on.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Shared bearer token for authentication.
    pub token: String,

    /// Log output format: "json" or "pretty".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            token: String::new(),
            log_format: default_log_format(),
        }
    }
}

/// Command-line overrides applied on top of the store config file.
#[derive(Debug, Default)]
pub struct StoreOverrides {
    pub config_file: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub default_quota: Option<u64>,
    pub store_timeout_ms: Option<u64>,
}

impl StoreOverrides {
    pub fn resolve(self) -> Result<FolioConfig> {
        let mut config = match &self.config_file {
            Some(path) => load_config(path)?,
            None => FolioConfig::default(),
        };
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(quota) = self.default_quota {
            config.default_quota = quota;
        }
        if let Some(ms) = self.store_timeout_ms {
            config.store_timeout_ms = ms;
        }
        Ok(config)
    }
}

fn default_listen() -> String {
    "127.0.0.1:8686".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
