//! Scrape pipeline: orchestration, merging, writing and trend computation.

pub mod merge;
pub mod orchestrator;
pub mod trends;
pub mod writer;

pub use merge::{merge, MergeOutcome};
pub use orchestrator::Orchestrator;
pub use trends::{
    city_comparison, count_history, daily_history, latest_counts, summarize, CityCounts, CountPoint,
    DailyCount, LatestCount, TimeWindow, TrendSummary,
};
pub use writer::{DatasetWriter, WriteSummary};
