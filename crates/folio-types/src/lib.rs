pub mod error;
pub mod snapshot_id;

pub use error::{ErrorKind, FolioError, Result};
pub use snapshot_id::SnapshotId;
