//! Ordered, `job_id`-unique record collections.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::types::job::JobRecord;

/// Durable ordered collection of records for one dataset key.
///
/// `job_id`s are unique and records are ordered by `scraped_at`
/// (non-decreasing). Only the merger appends to a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    records: Vec<JobRecord>,
    ids: HashSet<String>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored rows, keeping the first occurrence of each id.
    pub fn from_records(records: impl IntoIterator<Item = JobRecord>) -> Self {
        let mut dataset = Self::new();
        for record in records {
            dataset.push_unique(record);
        }
        dataset.restore_order();
        dataset
    }

    pub fn records(&self) -> &[JobRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<JobRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.ids.contains(job_id)
    }

    /// Snapshot of known ids, used for cross-run dedup.
    pub fn job_ids(&self) -> HashSet<String> {
        self.ids.clone()
    }

    /// Latest `scraped_at`, the reference "now" for trend windows.
    pub fn latest_scraped_at(&self) -> Option<DateTime<Utc>> {
        self.records.iter().map(|r| r.scraped_at).max()
    }

    /// Append if the id is new. Returns whether the record was added.
    pub(crate) fn push_unique(&mut self, record: JobRecord) -> bool {
        if self.ids.contains(&record.job_id) {
            return false;
        }
        self.ids.insert(record.job_id.clone());
        self.records.push(record);
        true
    }

    /// Stable sort by `scraped_at` when appends broke the ordering.
    pub(crate) fn restore_order(&mut self) {
        let ordered = self
            .records
            .windows(2)
            .all(|pair| pair[0].scraped_at <= pair[1].scraped_at);
        if !ordered {
            self.records.sort_by_key(|r| r.scraped_at);
        }
    }
}
