pub mod config;
pub mod engine;
pub mod folder;
pub mod history;
pub mod ledger;
pub mod locate;
pub mod lock;
pub mod quota;
pub mod redirect;
pub mod site;
pub mod store;

pub use folio_types::{error, ErrorKind, FolioError, Result, SnapshotId};

pub use config::{FolioConfig, QuotaPolicy};
pub use engine::edit::{Content, Edit, FileSet};
pub use engine::{FolderStore, MutationOutcome, PublishOutcome};
pub use folder::{EntryCounts, EntryKind, FolderEntry};
pub use locate::{SiteLocation, SiteSummary, Stats, TreeView, DEFAULT_TREE_DEPTH};
pub use store::{ContentStore, LocalContentStore};

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;
