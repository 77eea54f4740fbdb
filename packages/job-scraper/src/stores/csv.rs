//! CSV dataset store.
//!
//! Layout under the data directory:
//!
//! ```text
//! {root}/{position}/{position} in {city}.csv
//! {root}/{position}/TotalJobs/TotalJobs.csv
//! {root}/{position}/TotalJobs/CityCounts.csv
//! {root}/_runs/{timestamp}-{run_id}.json
//! ```
//!
//! Dataset files start with the [`JobRecord::HEADERS`] row, count histories
//! with [`CountSnapshot::HEADERS`]. Files with a different header are
//! rejected and never overwritten. Writes go to a
//! temporary file in the destination directory that is renamed over the old
//! file, so readers never see a partial dataset.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::DatasetStore;
use crate::types::counts::CountSnapshot;
use crate::types::dataset::Dataset;
use crate::types::job::JobRecord;
use crate::types::run::ScrapeRun;
use crate::types::target::{DatasetKey, DatasetScope, TOTAL_JOBS};

/// Directory holding run reports.
pub const RUNS_DIR: &str = "_runs";

/// File name of a position's upstream count history, next to its aggregate.
pub const COUNTS_FILE: &str = "CityCounts.csv";

/// Filesystem store of CSV datasets.
#[derive(Debug, Clone)]
pub struct CsvDatasetStore {
    root: PathBuf,
}

impl CsvDatasetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing a dataset.
    pub fn path_for(&self, key: &DatasetKey) -> PathBuf {
        let position_dir = self.root.join(&key.position);
        match &key.scope {
            DatasetScope::City(city) => position_dir.join(format!("{} in {}.csv", key.position, city)),
            DatasetScope::Aggregate => position_dir
                .join(TOTAL_JOBS)
                .join(format!("{TOTAL_JOBS}.csv")),
        }
    }

    /// File holding a position's upstream count history.
    pub fn counts_path(&self, position: &str) -> PathBuf {
        self.root.join(position).join(TOTAL_JOBS).join(COUNTS_FILE)
    }

    /// File a run report is written to.
    pub fn report_path(&self, run: &ScrapeRun) -> PathBuf {
        self.root.join(RUNS_DIR).join(format!(
            "{}-{}.json",
            run.started_at.format("%Y%m%dT%H%M%SZ"),
            run.run_id
        ))
    }
}

#[async_trait]
impl DatasetStore for CsvDatasetStore {
    async fn load(&self, key: &DatasetKey) -> StoreResult<Option<Dataset>> {
        let path = self.path_for(key);
        blocking(move || read_dataset(&path)).await
    }

    async fn save(&self, key: &DatasetKey, dataset: &Dataset) -> StoreResult<()> {
        let path = self.path_for(key);
        let records = dataset.records().to_vec();
        debug!(key = %key, path = %path.display(), rows = records.len(), "Saving dataset");
        blocking(move || write_dataset(&path, &records)).await
    }

    async fn positions(&self) -> StoreResult<Vec<String>> {
        let store = self.clone();
        blocking(move || {
            let mut positions = Vec::new();
            for name in subdirectories(&store.root)? {
                if name.starts_with('_') || name.starts_with('.') {
                    continue;
                }
                let has_aggregate = store.path_for(&DatasetKey::aggregate(&name)).is_file();
                if has_aggregate || !city_files(&store.root, &name)?.is_empty() {
                    positions.push(name);
                }
            }
            positions.sort();
            Ok(positions)
        })
        .await
    }

    async fn cities(&self, position: &str) -> StoreResult<Vec<String>> {
        let root = self.root.clone();
        let position = position.to_string();
        blocking(move || city_files(&root, &position)).await
    }

    async fn save_report(&self, run: &ScrapeRun) -> StoreResult<()> {
        let path = self.report_path(run);
        let json = serde_json::to_vec_pretty(run)?;
        blocking(move || write_atomically(&path, |file| Ok(file.write_all(&json)?))).await
    }

    async fn load_counts(&self, position: &str) -> StoreResult<Vec<CountSnapshot>> {
        let path = self.counts_path(position);
        blocking(move || read_rows(&path, &CountSnapshot::HEADERS).map(Option::unwrap_or_default)).await
    }

    async fn save_counts(&self, position: &str, history: &[CountSnapshot]) -> StoreResult<()> {
        let path = self.counts_path(position);
        let rows = history.to_vec();
        debug!(position, path = %path.display(), rows = rows.len(), "Saving count history");
        blocking(move || write_rows(&path, &CountSnapshot::HEADERS, &rows)).await
    }
}

async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

fn read_dataset(path: &Path) -> StoreResult<Option<Dataset>> {
    Ok(read_rows::<JobRecord>(path, &JobRecord::HEADERS)?.map(Dataset::from_records))
}

fn write_dataset(path: &Path, records: &[JobRecord]) -> StoreResult<()> {
    write_rows(path, &JobRecord::HEADERS, records)
}

/// Rows of a CSV file with the given header, `None` if it does not exist.
fn read_rows<T: DeserializeOwned>(path: &Path, headers: &[&str]) -> StoreResult<Option<Vec<T>>> {
    if !path.is_file() {
        return Ok(None);
    }

    let mut reader = ::csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    check_header(path, reader.headers()?, headers)?;

    let rows = reader.deserialize::<T>().collect::<Result<Vec<_>, _>>()?;
    Ok(Some(rows))
}

/// Replace a CSV file, refusing to touch one with a different header.
fn write_rows<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> StoreResult<()> {
    if path.is_file() {
        let mut reader = ::csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        check_header(path, reader.headers()?, headers)?;
    }

    write_atomically(path, |file| {
        let mut writer = ::csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(headers)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    })
}

fn check_header(path: &Path, found: &::csv::StringRecord, expected: &[&str]) -> StoreResult<()> {
    if found.iter().eq(expected.iter().copied()) {
        return Ok(());
    }
    Err(StoreError::HeaderMismatch {
        path: path.display().to_string(),
        expected: expected.iter().map(|h| h.to_string()).collect(),
        found: found.iter().map(str::to_string).collect(),
    })
}

/// Write through a temporary sibling file and rename it over `path`.
///
/// The temporary file is removed on every failure path when it drops.
fn write_atomically<F>(path: &Path, write: F) -> StoreResult<()>
where
    F: FnOnce(&mut fs::File) -> StoreResult<()>,
{
    let dir = path.parent().ok_or_else(|| StoreError::Persist {
        path: path.display().to_string(),
        reason: "path has no parent directory".to_string(),
    })?;
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;

    tmp.persist(path).map_err(|e| StoreError::Persist {
        path: path.display().to_string(),
        reason: e.error.to_string(),
    })?;
    Ok(())
}

fn subdirectories(dir: &Path) -> StoreResult<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Cities with a `{position} in {city}.csv` file, sorted.
fn city_files(root: &Path, position: &str) -> StoreResult<Vec<String>> {
    let dir = root.join(position);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let prefix = format!("{position} in ");
    let mut cities = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(city) = name
            .to_str()
            .and_then(|n| n.strip_prefix(&prefix))
            .and_then(|n| n.strip_suffix(".csv"))
        else {
            continue;
        };
        if !city.is_empty() {
            cities.push(city.to_string());
        }
    }
    cities.sort();
    Ok(cities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::job_record;
    use crate::types::counts::UpstreamCounts;

    #[test]
    fn test_paths() {
        let store = CsvDatasetStore::new("/data");

        assert_eq!(
            store.path_for(&DatasetKey::city("Software Engineer", "Toronto")),
            PathBuf::from("/data/Software Engineer/Software Engineer in Toronto.csv")
        );
        assert_eq!(
            store.path_for(&DatasetKey::aggregate("Software Engineer")),
            PathBuf::from("/data/Software Engineer/TotalJobs/TotalJobs.csv")
        );
    }

    #[tokio::test]
    async fn test_save_then_load_preserves_records_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvDatasetStore::new(dir.path());
        let key = DatasetKey::city("Dev", "Toronto");
        let dataset = Dataset::from_records([
            job_record("a", "Toronto", 0),
            job_record("b", "Toronto", 1),
        ]);

        store.save(&key, &dataset).await.unwrap();
        let loaded = store.load(&key).await.unwrap().unwrap();

        assert_eq!(loaded, dataset);
    }

    #[tokio::test]
    async fn test_empty_dataset_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvDatasetStore::new(dir.path());
        let key = DatasetKey::city("Dev", "Toronto");

        store.save(&key, &Dataset::new()).await.unwrap();

        let content = fs::read_to_string(store.path_for(&key)).unwrap();
        assert_eq!(content.trim_end(), JobRecord::HEADERS.join(","));
    }

    #[tokio::test]
    async fn test_header_mismatch_is_rejected_and_file_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvDatasetStore::new(dir.path());
        let key = DatasetKey::city("Dev", "Toronto");
        let path = store.path_for(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "title,company,location\nDev,Acme,Toronto\n").unwrap();

        assert!(matches!(
            store.load(&key).await,
            Err(StoreError::HeaderMismatch { .. })
        ));
        assert!(matches!(
            store.save(&key, &Dataset::new()).await,
            Err(StoreError::HeaderMismatch { .. })
        ));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "title,company,location\nDev,Acme,Toronto\n"
        );
    }

    #[tokio::test]
    async fn test_no_temporary_files_are_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvDatasetStore::new(dir.path());
        let key = DatasetKey::city("Dev", "Toronto");

        store
            .save(&key, &Dataset::from_records([job_record("a", "Toronto", 0)]))
            .await
            .unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path().join("Dev"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("Dev in Toronto.csv")]);
    }

    #[tokio::test]
    async fn test_count_history_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvDatasetStore::new(dir.path());
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let history = vec![
            CountSnapshot::new(
                date,
                "Ottawa",
                UpstreamCounts {
                    past_24h: Some(1),
                    past_week: Some(9),
                    past_month: None,
                    any_time: Some(40),
                },
            ),
            CountSnapshot::new(date, "Toronto", UpstreamCounts::default()),
        ];

        assert!(store.load_counts("Dev").await.unwrap().is_empty());
        store.save_counts("Dev", &history).await.unwrap();

        assert_eq!(store.load_counts("Dev").await.unwrap(), history);
        let content = fs::read_to_string(store.counts_path("Dev")).unwrap();
        assert!(content.starts_with("date,city,past_24h,past_week,past_month,any_time\n2024-03-01,Ottawa,1,9,,40\n"));
        // The count history is not a city dataset
        assert!(store.cities("Dev").await.unwrap().is_empty());
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_failed_write_keeps_old_file_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "old\n").unwrap();

        let result = write_atomically(&path, |file| {
            file.write_all(b"half a row")?;
            Err(StoreError::Task("writer gave up".to_string()))
        });

        assert!(matches!(result, Err(StoreError::Task(_))));
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\n");
        assert_eq!(file_names(dir.path()), vec!["data.csv"]);
    }

    #[test]
    fn test_failed_rename_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should go makes the final rename fail
        let path = dir.path().join("occupied");
        fs::create_dir(&path).unwrap();

        let result = write_atomically(&path, |file| Ok(file.write_all(b"data")?));

        assert!(matches!(result, Err(StoreError::Persist { .. })));
        assert!(path.is_dir());
        assert_eq!(file_names(dir.path()), vec!["occupied"]);
    }

    #[tokio::test]
    async fn test_listing_skips_reports_and_aggregates() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvDatasetStore::new(dir.path());
        let dataset = Dataset::from_records([job_record("a", "Toronto", 0)]);

        store.save(&DatasetKey::city("Dev", "Toronto"), &dataset).await.unwrap();
        store.save(&DatasetKey::city("Dev", "Calgary"), &dataset).await.unwrap();
        store.save(&DatasetKey::aggregate("Dev"), &dataset).await.unwrap();
        fs::create_dir_all(dir.path().join(RUNS_DIR)).unwrap();
        fs::create_dir_all(dir.path().join("Empty")).unwrap();

        assert_eq!(store.positions().await.unwrap(), vec!["Dev"]);
        assert_eq!(store.cities("Dev").await.unwrap(), vec!["Calgary", "Toronto"]);
        assert!(store.cities("Missing").await.unwrap().is_empty());
    }
}
