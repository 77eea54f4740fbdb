//! Dataset storage trait.
//!
//! Writers go through [`DatasetWriter`](crate::pipeline::writer::DatasetWriter);
//! the dashboard only reads.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::counts::CountSnapshot;
use crate::types::dataset::Dataset;
use crate::types::run::ScrapeRun;
use crate::types::target::DatasetKey;

/// Persistent home of datasets and run reports.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Load a dataset. `None` when it has never been written.
    async fn load(&self, key: &DatasetKey) -> StoreResult<Option<Dataset>>;

    /// Replace a dataset atomically: readers see the old or the new content,
    /// never a mix.
    async fn save(&self, key: &DatasetKey, dataset: &Dataset) -> StoreResult<()>;

    /// Positions that have at least one dataset, sorted.
    async fn positions(&self) -> StoreResult<Vec<String>>;

    /// Cities with a dataset for `position`, sorted.
    async fn cities(&self, position: &str) -> StoreResult<Vec<String>>;

    /// Persist a finished run report.
    async fn save_report(&self, run: &ScrapeRun) -> StoreResult<()>;

    /// Upstream count history of a position, ordered by date then city.
    /// Empty when nothing was recorded.
    async fn load_counts(&self, position: &str) -> StoreResult<Vec<CountSnapshot>>;

    /// Replace a position's upstream count history atomically.
    async fn save_counts(&self, position: &str, history: &[CountSnapshot]) -> StoreResult<()>;

    /// Load the `job_id` snapshot of a dataset (empty if absent).
    async fn snapshot_ids(&self, key: &DatasetKey) -> StoreResult<std::collections::HashSet<String>> {
        Ok(self
            .load(key)
            .await?
            .map(|dataset| dataset.job_ids())
            .unwrap_or_default())
    }
}
