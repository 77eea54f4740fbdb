//! Units of work and dataset addressing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Directory and file stem of the per-position aggregate.
pub const TOTAL_JOBS: &str = "TotalJobs";

/// One (city, position) unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScrapeTarget {
    pub city: String,
    pub position: String,
    pub max_jobs: usize,
}

impl ScrapeTarget {
    pub fn new(city: impl Into<String>, position: impl Into<String>, max_jobs: usize) -> Self {
        Self {
            city: city.into(),
            position: position.into(),
            max_jobs,
        }
    }

    /// Hard cap on search-page fetches: `ceil(max_jobs / page_size)`.
    pub fn max_pages(&self, page_size: usize) -> usize {
        self.max_jobs.div_ceil(page_size.max(1))
    }

    /// Key of the per-city dataset this target writes to.
    pub fn dataset_key(&self) -> DatasetKey {
        DatasetKey::city(&self.position, &self.city)
    }
}

impl fmt::Display for ScrapeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.position, self.city)
    }
}

/// Which dataset of a position is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "city")]
pub enum DatasetScope {
    City(String),
    /// Cross-city rollup ("TotalJobs")
    Aggregate,
}

/// Address of one persisted dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetKey {
    pub position: String,
    pub scope: DatasetScope,
}

impl DatasetKey {
    pub fn city(position: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            position: position.into(),
            scope: DatasetScope::City(city.into()),
        }
    }

    pub fn aggregate(position: impl Into<String>) -> Self {
        Self {
            position: position.into(),
            scope: DatasetScope::Aggregate,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.scope, DatasetScope::Aggregate)
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            DatasetScope::City(city) => write!(f, "{} in {}", self.position, city),
            DatasetScope::Aggregate => write!(f, "{}/{}", self.position, TOTAL_JOBS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_pages_rounds_up() {
        assert_eq!(ScrapeTarget::new("Ottawa", "Internship", 100).max_pages(25), 4);
        assert_eq!(ScrapeTarget::new("Ottawa", "Internship", 101).max_pages(25), 5);
        assert_eq!(ScrapeTarget::new("Ottawa", "Internship", 1).max_pages(25), 1);
    }

    #[test]
    fn test_dataset_key_display() {
        assert_eq!(
            DatasetKey::city("Software Engineer", "Toronto").to_string(),
            "Software Engineer in Toronto"
        );
        assert_eq!(
            DatasetKey::aggregate("Software Engineer").to_string(),
            "Software Engineer/TotalJobs"
        );
    }
}
