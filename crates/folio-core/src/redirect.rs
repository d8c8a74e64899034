use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use folio_types::SnapshotId;

/// Historical snapshot id -> live id of the same lineage.
///
/// Live ids are never keys: an absent id resolves to itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedirectTable {
    map: BTreeMap<SnapshotId, SnapshotId>,
}

impl RedirectTable {
    /// Point every id of `lineage` at `live`, so any of them resolves in one hop.
    pub fn advance<'a>(&mut self, lineage: impl IntoIterator<Item = &'a SnapshotId>, live: &SnapshotId) {
        for id in lineage {
            if id != live {
                self.map.insert(id.clone(), live.clone());
            }
        }
        // Content addressing can hand back an id that was historical.
        self.map.remove(live);
    }

    pub fn resolve(&self, id: &SnapshotId) -> SnapshotId {
        self.map.get(id).unwrap_or(id).clone()
    }

    pub fn get(&self, id: &SnapshotId) -> Option<&SnapshotId> {
        self.map.get(id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
