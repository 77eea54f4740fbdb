//! Testing utilities including mock implementations.
//!
//! These let the engine run end to end without network access or real time:
//! scripted HTTP responses, a virtual clock, a store that fails on demand and
//! record fixtures.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{StoreError, StoreResult, TransportError};
use crate::stores::MemoryDatasetStore;
use crate::traits::clock::Clock;
use crate::traits::store::DatasetStore;
use crate::traits::transport::Transport;
use crate::types::counts::CountSnapshot;
use crate::types::dataset::Dataset;
use crate::types::job::{CompanySize, EmploymentType, JobRecord, SeniorityLevel};
use crate::types::page::RawResponse;
use crate::types::run::ScrapeRun;
use crate::types::target::DatasetKey;

/// Start of virtual time for [`MockClock`] and the fixtures.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

// =============================================================================
// MockTransport
// =============================================================================

type ScriptedResponse = Result<RawResponse, TransportError>;

#[derive(Default)]
struct TransportState {
    /// Responses per URL; the last one repeats
    scripts: HashMap<String, VecDeque<ScriptedResponse>>,
    requests: Vec<String>,
    cancel_after: Option<(usize, CancellationToken)>,
}

/// A mock transport with scripted responses per URL.
///
/// Unknown URLs answer HTTP 404. Clones share state, so a test can keep a
/// clone to inspect the request log once the transport belongs to a fetcher.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<RwLock<TransportState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `url` with `response`.
    pub fn with_response(self, url: impl Into<String>, response: RawResponse) -> Self {
        self.with_sequence(url, vec![Ok(response)])
    }

    /// Answer `url` with a 200 and `body`.
    pub fn with_body(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        let url = url.into();
        let response = RawResponse::ok(url.clone(), body);
        self.with_response(url, response)
    }

    /// Answer successive requests to `url` in order; the last entry repeats.
    pub fn with_sequence(self, url: impl Into<String>, responses: Vec<ScriptedResponse>) -> Self {
        self.state
            .write()
            .unwrap()
            .scripts
            .insert(url.into(), responses.into());
        self
    }

    /// Cancel `token` once `requests` requests have been served.
    pub fn cancel_after(self, requests: usize, token: CancellationToken) -> Self {
        self.state.write().unwrap().cancel_after = Some((requests, token));
        self
    }

    /// Every requested URL, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state.read().unwrap().requests.clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.state
            .read()
            .unwrap()
            .requests
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        self.state.read().unwrap().requests.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let mut state = self.state.write().unwrap();
        state.requests.push(url.to_string());

        if let Some((after, token)) = &state.cancel_after {
            if state.requests.len() >= *after {
                token.cancel();
            }
        }

        match state.scripts.get_mut(url) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap_or_else(|| not_found(url)),
            Some(script) => script.front().cloned().unwrap_or_else(|| not_found(url)),
            None => not_found(url),
        }
    }
}

fn not_found(url: &str) -> ScriptedResponse {
    Ok(RawResponse::new(url, 404, ""))
}

// =============================================================================
// MockClock
// =============================================================================

/// Virtual clock on top of tokio's time source.
///
/// `now()` is a fixed start plus the tokio time elapsed since construction
/// plus any manual [`advance`](Self::advance). Under
/// `#[tokio::test(start_paused = true)]` sleeps complete instantly and in
/// deadline order, so concurrent workers observe consistent virtual time.
pub struct MockClock {
    start: DateTime<Utc>,
    origin: tokio::time::Instant,
    offset: RwLock<Duration>,
    sleeps: RwLock<Vec<Duration>>,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::starting_at(base_time())
    }
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start,
            origin: tokio::time::Instant::now(),
            offset: RwLock::new(Duration::ZERO),
            sleeps: RwLock::new(Vec::new()),
        }
    }

    /// Move time forward without sleeping.
    pub fn advance(&self, duration: Duration) {
        *self.offset.write().unwrap() += duration;
    }

    /// Every non-zero sleep requested so far.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.read().unwrap().clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().into_iter().sum()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.origin.elapsed() + *self.offset.read().unwrap();
        self.start + to_chrono(elapsed)
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        self.sleeps.write().unwrap().push(duration);
        tokio::time::sleep(duration).await;
    }
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap()
}

// =============================================================================
// FailingStore
// =============================================================================

/// A [`MemoryDatasetStore`] whose saves fail on demand.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryDatasetStore,
    remaining_failures: AtomicUsize,
    failing_keys: RwLock<HashSet<DatasetKey>>,
    save_attempts: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` saves, whatever the key.
    pub fn fail_next_saves(self, count: usize) -> Self {
        self.remaining_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Fail every save of `key`.
    pub fn fail_key(self, key: DatasetKey) -> Self {
        self.failing_keys.write().unwrap().insert(key);
        self
    }

    pub fn inner(&self) -> &MemoryDatasetStore {
        &self.inner
    }

    pub fn save_attempts(&self) -> usize {
        self.save_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatasetStore for FailingStore {
    async fn load(&self, key: &DatasetKey) -> StoreResult<Option<Dataset>> {
        self.inner.load(key).await
    }

    async fn save(&self, key: &DatasetKey, dataset: &Dataset) -> StoreResult<()> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);

        let scheduled = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scheduled || self.failing_keys.read().unwrap().contains(key) {
            return Err(StoreError::Backend(format!("injected save failure for {key}")));
        }

        self.inner.save(key, dataset).await
    }

    async fn positions(&self) -> StoreResult<Vec<String>> {
        self.inner.positions().await
    }

    async fn cities(&self, position: &str) -> StoreResult<Vec<String>> {
        self.inner.cities(position).await
    }

    async fn save_report(&self, run: &ScrapeRun) -> StoreResult<()> {
        self.inner.save_report(run).await
    }

    async fn load_counts(&self, position: &str) -> StoreResult<Vec<CountSnapshot>> {
        self.inner.load_counts(position).await
    }

    async fn save_counts(&self, position: &str, history: &[CountSnapshot]) -> StoreResult<()> {
        self.inner.save_counts(position, history).await
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A complete record observed `minutes` after [`base_time`], posted an hour
/// before that. Categorical fields are `unknown`.
pub fn job_record(job_id: &str, city: &str, minutes: i64) -> JobRecord {
    let scraped_at = base_time() + ChronoDuration::minutes(minutes);
    JobRecord {
        job_id: job_id.to_string(),
        title: "Software Engineer".to_string(),
        company_name: "Acme".to_string(),
        company_size_category: CompanySize::Unknown,
        company_industry: String::new(),
        location_city: city.to_string(),
        seniority_level: SeniorityLevel::Unknown,
        employment_type: EmploymentType::Unknown,
        posted_at: scraped_at - ChronoDuration::hours(1),
        scraped_at,
        source_url: format!("https://jobs.example.com/view/{job_id}"),
    }
}

/// A `json-feed` search page listing jobs with the given ids.
pub fn json_page(ids: &[&str], has_more: bool) -> String {
    let jobs: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| {
            serde_json::json!({
                "id": id,
                "title": format!("Engineer {id}"),
                "company": "Acme",
                "location": "Toronto, ON",
                "posted_at": "2 days ago",
                "url": format!("https://jobs.example.com/view/{id}"),
            })
        })
        .collect();

    serde_json::json!({ "jobs": jobs, "has_more": has_more }).to_string()
}
