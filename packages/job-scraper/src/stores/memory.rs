//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

use crate::error::StoreResult;
use crate::traits::store::DatasetStore;
use crate::types::counts::CountSnapshot;
use crate::types::dataset::Dataset;
use crate::types::run::ScrapeRun;
use crate::types::target::{DatasetKey, DatasetScope};

/// In-memory dataset store. Data is lost on drop.
#[derive(Default)]
pub struct MemoryDatasetStore {
    datasets: RwLock<HashMap<DatasetKey, Dataset>>,
    reports: RwLock<Vec<ScrapeRun>>,
    counts: RwLock<HashMap<String, Vec<CountSnapshot>>>,
}

impl MemoryDatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a dataset.
    pub async fn insert(&self, key: DatasetKey, dataset: Dataset) {
        self.datasets.write().await.insert(key, dataset);
    }

    /// Number of stored datasets, aggregates included.
    pub async fn dataset_count(&self) -> usize {
        self.datasets.read().await.len()
    }

    /// Reports saved so far, oldest first.
    pub async fn reports(&self) -> Vec<ScrapeRun> {
        self.reports.read().await.clone()
    }
}

#[async_trait]
impl DatasetStore for MemoryDatasetStore {
    async fn load(&self, key: &DatasetKey) -> StoreResult<Option<Dataset>> {
        Ok(self.datasets.read().await.get(key).cloned())
    }

    async fn save(&self, key: &DatasetKey, dataset: &Dataset) -> StoreResult<()> {
        self.datasets
            .write()
            .await
            .insert(key.clone(), dataset.clone());
        Ok(())
    }

    async fn positions(&self) -> StoreResult<Vec<String>> {
        let datasets = self.datasets.read().await;
        let positions: BTreeSet<String> = datasets.keys().map(|k| k.position.clone()).collect();
        Ok(positions.into_iter().collect())
    }

    async fn cities(&self, position: &str) -> StoreResult<Vec<String>> {
        let datasets = self.datasets.read().await;
        let cities: BTreeSet<String> = datasets
            .keys()
            .filter(|k| k.position == position)
            .filter_map(|k| match &k.scope {
                DatasetScope::City(city) => Some(city.clone()),
                DatasetScope::Aggregate => None,
            })
            .collect();
        Ok(cities.into_iter().collect())
    }

    async fn save_report(&self, run: &ScrapeRun) -> StoreResult<()> {
        self.reports.write().await.push(run.clone());
        Ok(())
    }

    async fn load_counts(&self, position: &str) -> StoreResult<Vec<CountSnapshot>> {
        Ok(self.counts.read().await.get(position).cloned().unwrap_or_default())
    }

    async fn save_counts(&self, position: &str, history: &[CountSnapshot]) -> StoreResult<()> {
        self.counts
            .write()
            .await
            .insert(position.to_string(), history.to_vec());
        Ok(())
    }
}
