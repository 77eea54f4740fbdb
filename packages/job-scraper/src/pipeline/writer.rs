//! Dataset writer: the only component that mutates persisted datasets.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::pipeline::merge::merge;
use crate::traits::store::DatasetStore;
use crate::types::counts::{merge_snapshots, CountSnapshot};
use crate::types::dataset::Dataset;
use crate::types::job::JobRecord;
use crate::types::target::DatasetKey;

/// Attempts per write (the first try plus one retry).
const WRITE_ATTEMPTS: u32 = 2;

/// Summary of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteSummary {
    pub added: usize,
    pub duplicates: usize,
    /// Records in the dataset after the write
    pub total: usize,
}

/// Merges records into stored datasets and rebuilds per-position aggregates.
///
/// Each write is load + merge + save and is retried once on failure.
/// Aggregate rebuilds of one position are serialized.
pub struct DatasetWriter {
    store: Arc<dyn DatasetStore>,
    aggregate_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DatasetWriter {
    pub fn new(store: Arc<dyn DatasetStore>) -> Self {
        Self {
            store,
            aggregate_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Merge a target's new records into its dataset.
    pub async fn write_target(&self, key: &DatasetKey, records: &[JobRecord]) -> StoreResult<WriteSummary> {
        let mut attempt = 1;
        loop {
            match self.merge_and_save(key, records).await {
                Ok(summary) => return Ok(summary),
                Err(e) if attempt < WRITE_ATTEMPTS => {
                    warn!(key = %key, attempt, error = %e, "Dataset write failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Rebuild `{position}/TotalJobs` from every city dataset of the position.
    pub async fn rebuild_aggregate(&self, position: &str) -> StoreResult<WriteSummary> {
        let lock = self.aggregate_lock(position).await;
        let _guard = lock.lock().await;

        let mut attempt = 1;
        loop {
            match self.merge_cities(position).await {
                Ok(summary) => return Ok(summary),
                Err(e) if attempt < WRITE_ATTEMPTS => {
                    warn!(position, attempt, error = %e, "Aggregate rebuild failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Add dated upstream count snapshots to a position's history.
    ///
    /// Shares the position's aggregate lock. Returns the history length.
    pub async fn record_counts(&self, position: &str, snapshots: Vec<CountSnapshot>) -> StoreResult<usize> {
        let lock = self.aggregate_lock(position).await;
        let _guard = lock.lock().await;

        let mut attempt = 1;
        loop {
            match self.merge_counts(position, &snapshots).await {
                Ok(rows) => {
                    debug!(position, snapshots = snapshots.len(), rows, "Count history written");
                    return Ok(rows);
                }
                Err(e) if attempt < WRITE_ATTEMPTS => {
                    warn!(position, attempt, error = %e, "Count history write failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn merge_counts(&self, position: &str, snapshots: &[CountSnapshot]) -> StoreResult<usize> {
        let history = self.store.load_counts(position).await?;
        let merged = merge_snapshots(history, snapshots.iter().cloned());
        self.store.save_counts(position, &merged).await?;
        Ok(merged.len())
    }

    async fn merge_and_save(&self, key: &DatasetKey, records: &[JobRecord]) -> StoreResult<WriteSummary> {
        let existing = self.store.load(key).await?;
        let existed = existing.is_some();
        let outcome = merge(existing.unwrap_or_default(), records.iter().cloned());

        // A no-op merge leaves the stored file untouched
        if existed && outcome.added == 0 {
            debug!(key = %key, duplicates = outcome.duplicates, "Nothing new, dataset unchanged");
        } else {
            self.store.save(key, &outcome.dataset).await?;
            debug!(key = %key, added = outcome.added, duplicates = outcome.duplicates, "Dataset written");
        }

        Ok(WriteSummary {
            added: outcome.added,
            duplicates: outcome.duplicates,
            total: outcome.dataset.len(),
        })
    }

    async fn merge_cities(&self, position: &str) -> StoreResult<WriteSummary> {
        let key = DatasetKey::aggregate(position);
        let existing = self.store.load(&key).await?;
        let existed = existing.is_some();
        let aggregate: Dataset = existing.unwrap_or_default();

        let mut incoming = Vec::new();
        for city in self.store.cities(position).await? {
            if let Some(city_dataset) = self.store.load(&DatasetKey::city(position, &city)).await? {
                incoming.extend(city_dataset.into_records());
            }
        }
        // Earliest observation of a posting across cities is its first sighting
        incoming.sort_by_key(|r| r.scraped_at);

        let outcome = merge(aggregate, incoming);
        if !existed || outcome.added > 0 {
            self.store.save(&key, &outcome.dataset).await?;
        }

        let summary = WriteSummary {
            added: outcome.added,
            duplicates: outcome.duplicates,
            total: outcome.dataset.len(),
        };
        debug!(position, added = summary.added, total = summary.total, "Aggregate rebuilt");

        Ok(summary)
    }

    async fn aggregate_lock(&self, position: &str) -> Arc<Mutex<()>> {
        self.aggregate_locks
            .lock()
            .await
            .entry(position.to_string())
            .or_default()
            .clone()
    }
}
