use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One discovered connection: a display label and the profile URL it points to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub label: String,
    pub locator: String,
}

impl CandidateRecord {
    pub fn new(label: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            locator: locator.into(),
        }
    }
}

/// Insertion-ordered set of records. Iteration yields records in the order
/// they were first seen; repeats are dropped.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    seen: HashSet<CandidateRecord>,
    records: Vec<CandidateRecord>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the record was not already present.
    pub fn add(&mut self, record: CandidateRecord) -> bool {
        if self.seen.contains(&record) {
            return false;
        }
        self.seen.insert(record.clone());
        self.records.push(record);
        true
    }

    /// Adds every record and returns the ones that were new, in order.
    pub fn extend_new<I>(&mut self, records: I) -> Vec<CandidateRecord>
    where
        I: IntoIterator<Item = CandidateRecord>,
    {
        self.extend_new_up_to(records, usize::MAX)
    }

    /// Like [`RecordSet::extend_new`], but stops after `limit` new records.
    /// Candidates past the limit are not added.
    pub fn extend_new_up_to<I>(&mut self, records: I, limit: usize) -> Vec<CandidateRecord>
    where
        I: IntoIterator<Item = CandidateRecord>,
    {
        let mut added = Vec::new();
        for record in records {
            if added.len() >= limit {
                break;
            }
            if self.add(record.clone()) {
                added.push(record);
            }
        }
        added
    }

    pub fn contains(&self, record: &CandidateRecord) -> bool {
        self.seen.contains(record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CandidateRecord> {
        self.records.iter()
    }

    pub fn into_vec(self) -> Vec<CandidateRecord> {
        self.records
    }
}

impl IntoIterator for RecordSet {
    type Item = CandidateRecord;
    type IntoIter = std::vec::IntoIter<CandidateRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a CandidateRecord;
    type IntoIter = std::slice::Iter<'a, CandidateRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
