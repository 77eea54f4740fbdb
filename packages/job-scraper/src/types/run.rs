//! Run bookkeeping and the end-of-run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::FailureClass;
use crate::types::counts::UpstreamCounts;
use crate::types::target::ScrapeTarget;

/// Terminal status of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Terminal error attached to a failed target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetError {
    pub class: FailureClass,
    pub message: String,
}

impl TargetError {
    pub fn new(class: FailureClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

/// Per-target outcome in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub city: String,
    pub position: String,
    pub status: TargetStatus,
    /// Completed, but pagination stopped on an unparseable page or some
    /// enrichment fetches failed
    pub partial: bool,
    pub pages_fetched: usize,
    /// Records persisted by this run (zero unless `Completed`)
    pub new_records: usize,
    pub duplicate_records: usize,
    pub invalid_records: usize,
    pub error: Option<TargetError>,
    /// Result counts the upstream reported for the search, when fetched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_counts: Option<UpstreamCounts>,
}

impl TargetOutcome {
    /// Outcome for a target that never started.
    pub fn cancelled(target: &ScrapeTarget) -> Self {
        Self {
            city: target.city.clone(),
            position: target.position.clone(),
            status: TargetStatus::Cancelled,
            partial: false,
            pages_fetched: 0,
            new_records: 0,
            duplicate_records: 0,
            invalid_records: 0,
            error: None,
            upstream_counts: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == TargetStatus::Failed
    }
}

/// Aggregate rebuild that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateFailure {
    pub position: String,
    pub message: String,
}

/// One execution over a set of targets. Finalized once, never mutated after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<TargetOutcome>,
    pub aggregate_failures: Vec<AggregateFailure>,
}

impl ScrapeRun {
    pub fn completed(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.with_status(TargetStatus::Completed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.with_status(TargetStatus::Failed)
    }

    pub fn cancelled(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.with_status(TargetStatus::Cancelled)
    }

    fn with_status(&self, status: TargetStatus) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(move |o| o.status == status)
    }

    pub fn total_new(&self) -> usize {
        self.outcomes.iter().map(|o| o.new_records).sum()
    }

    pub fn total_duplicates(&self) -> usize {
        self.outcomes.iter().map(|o| o.duplicate_records).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(TargetOutcome::is_failed) || !self.aggregate_failures.is_empty()
    }

    /// Find the outcome of a (city, position) pair.
    pub fn outcome(&self, city: &str, position: &str) -> Option<&TargetOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.city == city && o.position == position)
    }
}

impl fmt::Display for ScrapeRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "run {} ({} → {}): {} completed, {} failed, {} cancelled; {} new, {} duplicate",
            self.run_id,
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.finished_at.format("%H:%M:%S"),
            self.completed().count(),
            self.failed().count(),
            self.cancelled().count(),
            self.total_new(),
            self.total_duplicates(),
        )?;

        for outcome in &self.outcomes {
            write!(
                f,
                "  {:<10} {} in {}: {} new, {} duplicate, {} invalid, {} pages",
                format!("{:?}", outcome.status),
                outcome.position,
                outcome.city,
                outcome.new_records,
                outcome.duplicate_records,
                outcome.invalid_records,
                outcome.pages_fetched,
            )?;
            if outcome.partial {
                write!(f, " (partial)")?;
            }
            if let Some(total) = outcome.upstream_counts.and_then(|c| c.any_time) {
                write!(f, ", {total} listed upstream")?;
            }
            if let Some(error) = &outcome.error {
                write!(f, " [{}] {}", error.class, error.message)?;
            }
            writeln!(f)?;
        }

        for failure in &self.aggregate_failures {
            writeln!(f, "  aggregate {} failed: {}", failure.position, failure.message)?;
        }

        Ok(())
    }
}
