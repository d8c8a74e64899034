use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

type Blake2b256 = Blake2b<U32>;

/// Opaque identifier of an immutable snapshot, as handed out by the content store.
///
/// The folder store never interprets the string; it only compares, stores and
/// forwards it. The local reference store produces 64-char lowercase hex
/// BLAKE2b-256 digests via [`SnapshotId::digest`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Wrap an identifier returned by a content store.
    pub fn new(id: impl Into<String>) -> Self {
        SnapshotId(id.into())
    }

    /// Content address for `data`: hex-encoded BLAKE2b-256.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Blake2b256::new();
        hasher.update(data);
        SnapshotId(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First two characters, used as the shard directory by object stores.
    pub fn shard_prefix(&self) -> &str {
        let end = self.0.char_indices().nth(2).map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }

    /// True if the id looks like something a store could have produced.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 256
            && self.0.bytes().all(|b| b.is_ascii_alphanumeric())
    }
}

impl From<&str> for SnapshotId {
    fn from(value: &str) -> Self {
        SnapshotId::new(value)
    }
}

impl From<String> for SnapshotId {
    fn from(value: String) -> Self {
        SnapshotId(value)
    }
}

impl fmt::Debug for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.len().min(16);
        write!(f, "SnapshotId({})", &self.0[..end])
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
