use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use folio_types::SnapshotId;

/// One committed version of an account's folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub seq: u64,
    pub new_id: SnapshotId,
    /// `None` for the bootstrap record.
    pub previous_id: Option<SnapshotId>,
    pub action: String,
    /// Every entry path present in this version.
    pub roster: Vec<String>,
    pub time: DateTime<Utc>,
}

/// Append-only log of an account's folder versions. Sequence numbers start at 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryLog {
    records: Vec<HistoryRecord>,
}

impl HistoryLog {
    pub fn next_seq(&self) -> u64 {
        self.records.last().map_or(1, |r| r.seq + 1)
    }

    pub fn append(
        &mut self,
        new_id: SnapshotId,
        previous_id: Option<SnapshotId>,
        action: impl Into<String>,
        roster: Vec<String>,
        time: DateTime<Utc>,
    ) -> u64 {
        let seq = self.next_seq();
        self.records.push(HistoryRecord {
            seq,
            new_id,
            previous_id,
            action: action.into(),
            roster,
            time,
        });
        seq
    }

    pub fn latest(&self) -> Option<&HistoryRecord> {
        self.records.last()
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    /// The newest `limit` records, oldest first. `0` returns all.
    pub fn recent(&self, limit: usize) -> &[HistoryRecord] {
        if limit == 0 || limit >= self.records.len() {
            &self.records
        } else {
            &self.records[self.records.len() - limit..]
        }
    }

    /// Every snapshot id this lineage has ever issued or replaced.
    pub fn lineage(&self) -> impl Iterator<Item = &SnapshotId> {
        self.records
            .iter()
            .flat_map(|r| std::iter::once(&r.new_id).chain(r.previous_id.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
