//! Job Posting Trend Scraper
//!
//! Periodically collects job postings for a set of (city, position) targets
//! from a public job board, keeps one deduplicated dataset per target plus a
//! per-position `TotalJobs` rollup plus a dated history of the result counts
//! the upstream reports, and computes trend summaries over them.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator --> Fetcher (rate budget, retries) --> Transport (HTTP)
//!      |               |
//!      |               v
//!      |          ListingParser (site-specific)
//!      v
//! DatasetWriter (merge by job_id, atomic save) --> DatasetStore (CSV)
//!                                                      |
//!                                                      v
//!                                      Dashboard / trends (read-only)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use job_scraper::{Orchestrator, ScrapeConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ScrapeConfig::new()
//!     .with_cities(["Toronto", "Ottawa"])
//!     .with_positions(["Software Engineer"]);
//!
//! let orchestrator = Orchestrator::from_config(config)?;
//! let run = orchestrator.run(CancellationToken::new()).await?;
//! println!("{run}");
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Seams: Clock, Transport, Fetcher, ListingParser, DatasetStore
//! - [`types`] - Records, targets, datasets, config and run reports
//! - [`fetch`] - Per-host rate budget, retry policy, reqwest transport
//! - [`parsers`] - `linkedin-guest` and `json-feed` parsers
//! - [`pipeline`] - Orchestrator, merge, writer and trend aggregation
//! - [`stores`] - CSV and in-memory dataset stores
//! - [`dashboard`] - Read-only query contract
//! - [`testing`] - Mock implementations for testing

pub mod dashboard;
pub mod error;
pub mod fetch;
pub mod parsers;
pub mod pipeline;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use dashboard::{Dashboard, DashboardQuery, DashboardView};
pub use error::{
    ConfigError, FailureClass, FetchError, ParseError, Result, ScrapeError, StoreError,
    TransportError,
};
pub use fetch::{FetchPolicy, RateBudget, RateLimitedFetcher, ReqwestTransport};
pub use parsers::{build_parser, JsonFeedParser, LinkedInGuestParser};
pub use pipeline::{
    city_comparison, count_history, daily_history, latest_counts, merge, summarize, CityCounts,
    CountPoint, DailyCount, DatasetWriter, LatestCount, MergeOutcome, Orchestrator, TimeWindow,
    TrendSummary, WriteSummary,
};
pub use stores::{CsvDatasetStore, MemoryDatasetStore};
pub use traits::{
    clock::{Clock, SystemClock},
    fetcher::{FetchContext, Fetcher},
    parser::{CompanyDetails, JobDetails, ListingParser, ParsedPage},
    store::DatasetStore,
    transport::Transport,
};
pub use types::{
    config::{ScrapeConfig, SourceFormat},
    counts::{CountSnapshot, UpstreamCounts},
    dataset::Dataset,
    job::{CandidateJob, CompanySize, EmploymentType, JobRecord, SeniorityLevel},
    page::{Page, RawResponse},
    run::{AggregateFailure, ScrapeRun, TargetError, TargetOutcome, TargetStatus},
    target::{DatasetKey, DatasetScope, ScrapeTarget, TOTAL_JOBS},
};
