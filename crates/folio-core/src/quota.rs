use serde::{Deserialize, Serialize};

use folio_types::error::{FolioError, Result};

use crate::folder::FolderDirectory;

/// Byte budget of one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub used: u64,
    pub limit: u64,
}

impl Quota {
    pub fn new(limit: u64) -> Self {
        Self { used: 0, limit }
    }

    pub fn available(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    pub fn charge(&mut self, bytes: u64) {
        self.used = self.used.saturating_add(bytes);
    }

    pub fn release(&mut self, bytes: u64) {
        self.used = self.used.saturating_sub(bytes);
    }
}

/// Would charging `bytes` keep usage within the limit?
///
/// `released` is credited first (bytes a replacement gives back under the
/// release policy). Pure; the caller commits the charge after the store write.
pub fn check_and_reserve(quota: &Quota, bytes: u64, released: u64) -> Result<()> {
    let base = quota.used.saturating_sub(released);
    if base.saturating_add(bytes) > quota.limit {
        return Err(FolioError::QuotaExceeded {
            requested: bytes,
            available: quota.limit.saturating_sub(base),
        });
    }
    Ok(())
}

/// Usage implied by the tracked entries plus the folder skeleton.
pub fn recompute(directory: &FolderDirectory, bootstrap_size: u64) -> u64 {
    bootstrap_size.saturating_add(directory.total_size())
}

/// Corrected usage if `used` differs from `recomputed` by more than `tolerance`.
pub fn drift_correction(used: u64, recomputed: u64, tolerance: u64) -> Option<u64> {
    (used.abs_diff(recomputed) > tolerance).then_some(recomputed)
}
