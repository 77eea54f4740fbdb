//! Scrape orchestrator.
//!
//! Expands the configuration into targets, runs them on a bounded worker pool
//! and hands finished targets to the [`DatasetWriter`]. Each target walks an
//! explicit state machine:
//!
//! ```text
//! Pending -> Fetching -> Parsing -> Accumulating -> Paginating -> Fetching ...
//!                                                \-> Completed
//! Fetching -> Failed | Cancelled
//! ```
//!
//! A target's failure never affects other targets. Every target ends up in
//! the run report as `Completed`, `Failed` or `Cancelled`. Completed targets
//! also look up the result counts the upstream reports for their search;
//! those are appended to the position's dated count history after the run.

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{FailureClass, FetchError, ScrapeError};
use crate::fetch::{RateLimitedFetcher, ReqwestTransport};
use crate::parsers::build_parser;
use crate::pipeline::writer::DatasetWriter;
use crate::stores::CsvDatasetStore;
use crate::traits::clock::{Clock, SystemClock};
use crate::traits::fetcher::{FetchContext, Fetcher};
use crate::traits::parser::{CompanyDetails, ListingParser, ParsedPage};
use crate::traits::store::DatasetStore;
use crate::types::config::ScrapeConfig;
use crate::types::counts::{CountSnapshot, UpstreamCounts};
use crate::types::job::JobRecord;
use crate::types::page::Page;
use crate::types::run::{AggregateFailure, ScrapeRun, TargetError, TargetOutcome, TargetStatus};
use crate::types::target::ScrapeTarget;

/// Company pages fetched during a run, keyed by URL. `None` marks a failed fetch.
type CompanyCache = Mutex<HashMap<String, Option<CompanyDetails>>>;

/// State of one target's pagination.
#[derive(Debug)]
enum TargetPhase {
    Pending,
    Fetching,
    Parsing(Page),
    Accumulating(ParsedPage),
    Paginating,
    Completed,
    Failed(TargetError),
    Cancelled,
}

impl TargetPhase {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::Cancelled)
    }
}

/// A validated record waiting to be written, plus what enrichment needs.
#[derive(Debug)]
struct PendingRecord {
    record: JobRecord,
    company_url: Option<String>,
}

/// Working state of one target.
struct TargetScrape<'a> {
    target: &'a ScrapeTarget,
    /// Prior dataset ids plus ids accepted so far in this run
    known: HashSet<String>,
    buffer: Vec<PendingRecord>,
    page_index: usize,
    pages_fetched: usize,
    max_pages: usize,
    /// The current cursor has already been re-fetched after a parse error
    parse_retried: bool,
    partial: bool,
    duplicates: usize,
    invalid: usize,
    upstream: Option<UpstreamCounts>,
}

impl<'a> TargetScrape<'a> {
    fn new(target: &'a ScrapeTarget, snapshot: HashSet<String>, page_size: usize) -> Self {
        Self {
            target,
            known: snapshot,
            buffer: Vec::new(),
            page_index: 0,
            pages_fetched: 0,
            max_pages: target.max_pages(page_size),
            parse_retried: false,
            partial: false,
            duplicates: 0,
            invalid: 0,
            upstream: None,
        }
    }

    fn is_full(&self) -> bool {
        self.buffer.len() >= self.target.max_jobs
    }

    fn outcome(&self, status: TargetStatus, error: Option<TargetError>) -> TargetOutcome {
        TargetOutcome {
            city: self.target.city.clone(),
            position: self.target.position.clone(),
            status,
            partial: self.partial,
            pages_fetched: self.pages_fetched,
            new_records: 0,
            duplicate_records: self.duplicates,
            invalid_records: self.invalid,
            error,
            upstream_counts: self.upstream,
        }
    }
}

enum Enrichment {
    Done,
    Cancelled,
}

/// Drives a scrape run.
pub struct Orchestrator {
    config: ScrapeConfig,
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn ListingParser>,
    store: Arc<dyn DatasetStore>,
    writer: DatasetWriter,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    /// Assemble an orchestrator. Rejects invalid configuration.
    pub fn new(
        config: ScrapeConfig,
        fetcher: Arc<dyn Fetcher>,
        parser: Arc<dyn ListingParser>,
        store: Arc<dyn DatasetStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ScrapeError> {
        config.validate()?;
        Ok(Self {
            writer: DatasetWriter::new(store.clone()),
            config,
            fetcher,
            parser,
            store,
            clock,
        })
    }

    /// Production wiring: reqwest transport, system clock, CSV store under
    /// `config.data_dir` and the parser for `config.source_format`.
    pub fn from_config(config: ScrapeConfig) -> Result<Self, ScrapeError> {
        config.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let transport = Arc::new(ReqwestTransport::from_config(&config)?);
        let fetcher = Arc::new(RateLimitedFetcher::from_config(&config, transport, clock.clone()));
        let parser = build_parser(&config)?;
        let store = Arc::new(CsvDatasetStore::new(config.data_dir.clone()));

        Self::new(config, fetcher, parser, store, clock)
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Run every target, rebuild aggregates and persist the run report.
    ///
    /// Only configuration errors are returned; per-target failures end up in
    /// the report.
    pub async fn run(&self, cancel: CancellationToken) -> Result<ScrapeRun, ScrapeError> {
        self.config.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = self.clock.now();
        let targets = self.config.targets();
        info!(
            %run_id,
            targets = targets.len(),
            concurrency = self.config.max_concurrent_targets,
            parser = self.parser.name(),
            "Starting scrape run"
        );

        let companies = CompanyCache::default();
        let mut results: Vec<(usize, TargetOutcome)> = stream::iter(targets.iter().enumerate())
            .map(|(index, target)| {
                let cancel = &cancel;
                let companies = &companies;
                async move { (index, self.process_target(target, cancel, companies).await) }
            })
            .buffer_unordered(self.config.max_concurrent_targets)
            .collect()
            .await;
        results.sort_by_key(|(index, _)| *index);
        let outcomes: Vec<TargetOutcome> = results.into_iter().map(|(_, outcome)| outcome).collect();

        let mut aggregate_failures = self.rebuild_aggregates(&outcomes).await;
        aggregate_failures.extend(self.record_counts(&outcomes, started_at.date_naive()).await);

        let run = ScrapeRun {
            run_id,
            started_at,
            finished_at: self.clock.now(),
            outcomes,
            aggregate_failures,
        };

        if let Err(e) = self.store.save_report(&run).await {
            warn!(%run_id, error = %e, "Failed to save run report");
        }

        info!(
            %run_id,
            completed = run.completed().count(),
            failed = run.failed().count(),
            cancelled = run.cancelled().count(),
            new_records = run.total_new(),
            duplicates = run.total_duplicates(),
            "Scrape run finished"
        );
        Ok(run)
    }

    /// Scrape, enrich and write one target.
    async fn process_target(
        &self,
        target: &ScrapeTarget,
        cancel: &CancellationToken,
        companies: &CompanyCache,
    ) -> TargetOutcome {
        if cancel.is_cancelled() {
            info!(city = %target.city, position = %target.position, "Target cancelled before start");
            return TargetOutcome::cancelled(target);
        }

        let key = target.dataset_key();
        let snapshot = match self.store.snapshot_ids(&key).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(city = %target.city, position = %target.position, error = %e, "Could not load existing dataset");
                let scrape = TargetScrape::new(target, HashSet::new(), self.parser.page_size());
                return scrape.outcome(
                    TargetStatus::Failed,
                    Some(TargetError::new(FailureClass::Merge, e.to_string())),
                );
            }
        };

        info!(city = %target.city, position = %target.position, known = snapshot.len(), "Scraping target");
        let ctx = FetchContext::new(target.to_string(), cancel.clone());
        let mut scrape = TargetScrape::new(target, snapshot, self.parser.page_size());

        match self.collect(&mut scrape, &ctx).await {
            TargetPhase::Completed if !ctx.is_cancelled() => {}
            TargetPhase::Failed(err) => {
                error!(
                    city = %target.city,
                    position = %target.position,
                    class = %err.class,
                    error = %err.message,
                    "Target failed"
                );
                return scrape.outcome(TargetStatus::Failed, Some(err));
            }
            _ => {
                info!(city = %target.city, position = %target.position, "Target cancelled");
                return scrape.outcome(TargetStatus::Cancelled, None);
            }
        }

        match self.upstream_counts(target, &ctx).await {
            Ok(counts) => scrape.upstream = counts,
            Err(_) => {
                info!(city = %target.city, position = %target.position, "Target cancelled while reading counts");
                return scrape.outcome(TargetStatus::Cancelled, None);
            }
        }

        if let Enrichment::Cancelled = self.enrich(&mut scrape, &ctx, companies).await {
            info!(city = %target.city, position = %target.position, "Target cancelled during enrichment");
            return scrape.outcome(TargetStatus::Cancelled, None);
        }

        let records: Vec<JobRecord> = scrape.buffer.drain(..).map(|p| p.record).collect();
        match self.writer.write_target(&key, &records).await {
            Ok(summary) => {
                let mut outcome = scrape.outcome(TargetStatus::Completed, None);
                outcome.new_records = summary.added;
                outcome.duplicate_records += summary.duplicates;
                info!(
                    city = %target.city,
                    position = %target.position,
                    new_records = outcome.new_records,
                    duplicates = outcome.duplicate_records,
                    invalid = outcome.invalid_records,
                    pages = outcome.pages_fetched,
                    partial = outcome.partial,
                    "Target completed"
                );
                outcome
            }
            Err(e) => {
                error!(city = %target.city, position = %target.position, error = %e, "Dataset write failed");
                scrape.outcome(
                    TargetStatus::Failed,
                    Some(TargetError::new(FailureClass::Merge, e.to_string())),
                )
            }
        }
    }

    /// Walk the pagination state machine to a terminal phase.
    async fn collect(&self, scrape: &mut TargetScrape<'_>, ctx: &FetchContext) -> TargetPhase {
        let mut phase = TargetPhase::Pending;
        while !phase.is_terminal() {
            phase = match phase {
                TargetPhase::Pending => TargetPhase::Fetching,
                TargetPhase::Fetching => self.fetch_search_page(scrape, ctx).await,
                TargetPhase::Parsing(page) => self.parse_search_page(scrape, &page),
                TargetPhase::Accumulating(parsed) => self.accumulate(scrape, parsed),
                TargetPhase::Paginating => {
                    scrape.page_index += 1;
                    TargetPhase::Fetching
                }
                terminal => terminal,
            };
        }
        phase
    }

    async fn fetch_search_page(&self, scrape: &mut TargetScrape<'_>, ctx: &FetchContext) -> TargetPhase {
        if ctx.is_cancelled() {
            return TargetPhase::Cancelled;
        }
        if scrape.pages_fetched >= scrape.max_pages {
            debug!(target_label = %ctx.label, pages = scrape.pages_fetched, "Page cap reached");
            // The last page never parsed
            if scrape.parse_retried {
                scrape.partial = true;
            }
            return TargetPhase::Completed;
        }

        let url = self.parser.search_url(scrape.target, scrape.page_index);
        scrape.pages_fetched += 1;
        debug!(target_label = %ctx.label, page = scrape.page_index, url = %url, "Fetching search page");

        match self.fetcher.fetch(&url, ctx).await {
            Ok(page) => TargetPhase::Parsing(page),
            Err(FetchError::Cancelled { .. }) => TargetPhase::Cancelled,
            Err(e) => TargetPhase::Failed(TargetError::new(e.class(), e.to_string())),
        }
    }

    fn parse_search_page(&self, scrape: &mut TargetScrape<'_>, page: &Page) -> TargetPhase {
        match self.parser.parse_search(page) {
            Ok(parsed) => {
                scrape.parse_retried = false;
                TargetPhase::Accumulating(parsed)
            }
            Err(e) if !scrape.parse_retried => {
                warn!(url = %page.url, error = %e, "Parse failed, re-fetching page");
                scrape.parse_retried = true;
                TargetPhase::Fetching
            }
            Err(e) => {
                warn!(url = %page.url, error = %e, "Parse failed again, ending pagination");
                scrape.partial = true;
                TargetPhase::Completed
            }
        }
    }

    fn accumulate(&self, scrape: &mut TargetScrape<'_>, parsed: ParsedPage) -> TargetPhase {
        let scraped_at = self.clock.now();
        let mut accepted = 0;

        for candidate in parsed.candidates {
            if scrape.is_full() {
                break;
            }
            let company_url = candidate.company_url.clone();
            let Some(record) = candidate.into_record(&scrape.target.city, scraped_at) else {
                scrape.invalid += 1;
                continue;
            };
            if !scrape.known.insert(record.job_id.clone()) {
                scrape.duplicates += 1;
                continue;
            }
            scrape.buffer.push(PendingRecord { record, company_url });
            accepted += 1;
        }

        debug!(
            city = %scrape.target.city,
            position = %scrape.target.position,
            page = scrape.page_index,
            accepted,
            buffered = scrape.buffer.len(),
            has_next_page = parsed.has_next_page,
            "Page accumulated"
        );

        if parsed.has_next_page && !scrape.is_full() {
            TargetPhase::Paginating
        } else {
            TargetPhase::Completed
        }
    }

    /// Result counts the upstream reports for a target's search.
    ///
    /// `None` when disabled, unsupported by the source or unavailable. Only
    /// cancellation is returned as an error.
    async fn upstream_counts(
        &self,
        target: &ScrapeTarget,
        ctx: &FetchContext,
    ) -> Result<Option<UpstreamCounts>, FetchError> {
        if !self.config.fetch_total_counts {
            return Ok(None);
        }
        let Some(url) = self.parser.counts_url(target) else {
            return Ok(None);
        };

        match self.fetcher.fetch(&url, ctx).await {
            Ok(page) => match self.parser.parse_total_counts(&page) {
                Ok(counts) if counts.is_empty() => {
                    warn!(url = %page.url, "Counts page reported no windows");
                    Ok(None)
                }
                Ok(counts) => {
                    debug!(target_label = %ctx.label, any_time = ?counts.any_time, "Upstream counts read");
                    Ok(Some(counts))
                }
                Err(e) => {
                    warn!(url = %page.url, error = %e, "Counts page parse failed");
                    Ok(None)
                }
            },
            Err(e @ FetchError::Cancelled { .. }) => Err(e),
            Err(e) => {
                warn!(target_label = %ctx.label, error = %e, "Counts page fetch failed");
                Ok(None)
            }
        }
    }

    /// Fetch listing and company pages for buffered records.
    ///
    /// Failures leave fields `unknown` and mark the target partial.
    async fn enrich(&self, scrape: &mut TargetScrape<'_>, ctx: &FetchContext, companies: &CompanyCache) -> Enrichment {
        let listings = self.config.fetch_listing_details;
        let company_pages = self.config.fetch_company_details;
        if !(listings || company_pages) || scrape.buffer.is_empty() {
            return Enrichment::Done;
        }

        debug!(target_label = %ctx.label, records = scrape.buffer.len(), "Enriching records");
        for pending in scrape.buffer.iter_mut() {
            if ctx.is_cancelled() {
                return Enrichment::Cancelled;
            }

            if listings && !pending.record.source_url.is_empty() {
                match self.fetcher.fetch(&pending.record.source_url, ctx).await {
                    Ok(page) => match self.parser.parse_listing(&page) {
                        Ok(details) => {
                            details.apply_to(&mut pending.record);
                            if pending.company_url.is_none() {
                                pending.company_url = details.company_url;
                            }
                        }
                        Err(e) => {
                            warn!(url = %page.url, error = %e, "Listing page parse failed");
                            scrape.partial = true;
                        }
                    },
                    Err(FetchError::Cancelled { .. }) => return Enrichment::Cancelled,
                    Err(e) => {
                        warn!(job_id = %pending.record.job_id, error = %e, "Listing page fetch failed");
                        scrape.partial = true;
                    }
                }
            }

            if company_pages {
                if let Some(url) = pending.company_url.as_deref() {
                    match self.company_details(url, ctx, companies).await {
                        Ok(Some(details)) => details.apply_to(&mut pending.record),
                        Ok(None) => scrape.partial = true,
                        Err(_) => return Enrichment::Cancelled,
                    }
                }
            }
        }

        Enrichment::Done
    }

    /// Company details from the run cache, fetching on a miss.
    ///
    /// Only cancellation is returned as an error.
    async fn company_details(
        &self,
        url: &str,
        ctx: &FetchContext,
        companies: &CompanyCache,
    ) -> Result<Option<CompanyDetails>, FetchError> {
        if let Some(cached) = companies.lock().await.get(url) {
            return Ok(cached.clone());
        }

        let details = match self.fetcher.fetch(url, ctx).await {
            Ok(page) => match self.parser.parse_company(&page) {
                Ok(details) => Some(details),
                Err(e) => {
                    warn!(url, error = %e, "Company page parse failed");
                    None
                }
            },
            Err(e @ FetchError::Cancelled { .. }) => return Err(e),
            Err(e) => {
                warn!(url, error = %e, "Company page fetch failed");
                None
            }
        };

        companies.lock().await.insert(url.to_string(), details.clone());
        Ok(details)
    }

    /// Append this run's upstream counts to each position's history.
    async fn record_counts(&self, outcomes: &[TargetOutcome], date: NaiveDate) -> Vec<AggregateFailure> {
        let mut by_position: IndexMap<&str, Vec<CountSnapshot>> = IndexMap::new();
        for outcome in outcomes {
            if outcome.status != TargetStatus::Completed {
                continue;
            }
            if let Some(counts) = outcome.upstream_counts {
                by_position
                    .entry(outcome.position.as_str())
                    .or_default()
                    .push(CountSnapshot::new(date, &outcome.city, counts));
            }
        }

        let mut failures = Vec::new();
        for (position, snapshots) in by_position {
            match self.writer.record_counts(position, snapshots).await {
                Ok(rows) => info!(position, rows, "Count history updated"),
                Err(e) => {
                    warn!(position, error = %e, "Count history update failed");
                    failures.push(AggregateFailure {
                        position: position.to_string(),
                        message: format!("count history: {e}"),
                    });
                }
            }
        }
        failures
    }

    /// Rebuild the aggregate of every position with a completed target.
    async fn rebuild_aggregates(&self, outcomes: &[TargetOutcome]) -> Vec<AggregateFailure> {
        let positions: IndexSet<&str> = outcomes
            .iter()
            .filter(|o| o.status == TargetStatus::Completed)
            .map(|o| o.position.as_str())
            .collect();

        let mut failures = Vec::new();
        for position in positions {
            match self.writer.rebuild_aggregate(position).await {
                Ok(summary) => {
                    info!(position, added = summary.added, total = summary.total, "Aggregate rebuilt");
                }
                Err(e) => {
                    warn!(position, error = %e, "Aggregate rebuild failed");
                    failures.push(AggregateFailure {
                        position: position.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
        failures
    }
}
