//! Read-only dashboard contract over persisted datasets.
//!
//! The dashboard never writes. It loads one dataset (a city's or the
//! position's `TotalJobs` aggregate) plus the position's upstream count
//! history and derives summaries on read.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Result, ScrapeError};
use crate::pipeline::trends::{
    city_comparison, count_history, daily_history, in_window, latest_counts, summarize, CityCounts,
    CountPoint, DailyCount, LatestCount, TimeWindow, TrendSummary,
};
use crate::traits::store::DatasetStore;
use crate::types::job::JobRecord;
use crate::types::target::DatasetKey;

/// What to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardQuery {
    pub position: String,
    /// `None` selects the position's aggregate
    pub city: Option<String>,
    #[serde(default)]
    pub window: TimeWindow,
}

impl DashboardQuery {
    pub fn new(position: impl Into<String>) -> Self {
        Self {
            position: position.into(),
            city: None,
            window: TimeWindow::All,
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn dataset_key(&self) -> DatasetKey {
        match &self.city {
            Some(city) => DatasetKey::city(&self.position, city),
            None => DatasetKey::aggregate(&self.position),
        }
    }
}

/// Everything a dashboard page renders for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardView {
    pub key: DatasetKey,
    pub summary: TrendSummary,
    /// Records in the window, in dataset order
    pub records: Vec<JobRecord>,
    /// Cities with a dataset for the position
    pub cities: Vec<String>,
    /// Per-city window counts over the whole loaded dataset
    pub comparison: Vec<CityCounts>,
    pub history: Vec<DailyCount>,
    /// Each city's latest upstream-reported count for the query window
    pub upstream: Vec<LatestCount>,
    /// Upstream-reported counts for the query window over time; summed over
    /// cities for the aggregate
    pub upstream_history: Vec<CountPoint>,
}

/// Read side of the dataset store.
#[derive(Clone)]
pub struct Dashboard {
    store: Arc<dyn DatasetStore>,
}

impl Dashboard {
    pub fn new(store: Arc<dyn DatasetStore>) -> Self {
        Self { store }
    }

    /// Positions with stored datasets.
    pub async fn positions(&self) -> Result<Vec<String>> {
        Ok(self.store.positions().await?)
    }

    /// Cities with a dataset for `position`.
    pub async fn cities(&self, position: &str) -> Result<Vec<String>> {
        Ok(self.store.cities(position).await?)
    }

    /// Build the view for a query.
    pub async fn view(&self, query: &DashboardQuery) -> Result<DashboardView> {
        let key = query.dataset_key();
        let dataset = self
            .store
            .load(&key)
            .await?
            .ok_or_else(|| ScrapeError::DatasetNotFound { key: key.clone() })?;
        let records = dataset.records();
        let snapshots = self.store.load_counts(&query.position).await?;

        Ok(DashboardView {
            summary: summarize(records, query.window),
            records: in_window(records, query.window).into_iter().cloned().collect(),
            cities: self.store.cities(&query.position).await?,
            comparison: city_comparison(records),
            history: daily_history(records, query.city.as_deref()),
            upstream: latest_counts(&snapshots, query.window),
            upstream_history: count_history(&snapshots, query.city.as_deref(), query.window),
            key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryDatasetStore;
    use crate::testing::job_record;
    use crate::types::counts::{CountSnapshot, UpstreamCounts};
    use crate::types::dataset::Dataset;

    #[tokio::test]
    async fn test_missing_dataset_is_not_found() {
        let dashboard = Dashboard::new(Arc::new(MemoryDatasetStore::new()));

        let err = dashboard.view(&DashboardQuery::new("Dev")).await.unwrap_err();
        assert!(matches!(err, ScrapeError::DatasetNotFound { .. }));
    }

    #[tokio::test]
    async fn test_city_view() {
        let store = Arc::new(MemoryDatasetStore::new());
        store
            .insert(
                DatasetKey::city("Dev", "Toronto"),
                Dataset::from_records([job_record("a", "Toronto", 0), job_record("b", "Toronto", 5)]),
            )
            .await;
        let dashboard = Dashboard::new(store);

        let view = dashboard
            .view(&DashboardQuery::new("Dev").with_city("Toronto").with_window(TimeWindow::Week))
            .await
            .unwrap();

        assert_eq!(view.summary.total, 2);
        assert!(view.summary.reconciles());
        assert_eq!(view.records.len(), 2);
        assert_eq!(view.cities, vec!["Toronto"]);
        assert_eq!(view.history.last().map(|d| d.cumulative), Some(2));
        assert!(view.upstream.is_empty());
    }

    #[tokio::test]
    async fn test_view_carries_upstream_counts() {
        let store = Arc::new(MemoryDatasetStore::new());
        store
            .insert(
                DatasetKey::city("Dev", "Toronto"),
                Dataset::from_records([job_record("a", "Toronto", 0)]),
            )
            .await;
        let day = |d| chrono::NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
        let weekly = |week| UpstreamCounts {
            past_week: Some(week),
            any_time: Some(week * 10),
            ..Default::default()
        };
        store
            .save_counts(
                "Dev",
                &[
                    CountSnapshot::new(day(1), "Toronto", weekly(30)),
                    CountSnapshot::new(day(1), "Ottawa", weekly(8)),
                    CountSnapshot::new(day(2), "Toronto", weekly(36)),
                ],
            )
            .await
            .unwrap();
        let dashboard = Dashboard::new(store);

        let view = dashboard
            .view(&DashboardQuery::new("Dev").with_city("Toronto").with_window(TimeWindow::Week))
            .await
            .unwrap();

        assert_eq!(view.upstream[0].city, "Toronto");
        assert_eq!(view.upstream[0].count, 36);
        assert_eq!(view.upstream[0].delta, Some(6));
        assert_eq!(view.upstream[1].city, "Ottawa");
        let history: Vec<_> = view.upstream_history.iter().map(|p| p.count).collect();
        assert_eq!(history, vec![30, 36]);
    }
}
