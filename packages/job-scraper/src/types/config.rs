//! Run configuration.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::target::{ScrapeTarget, TOTAL_JOBS};

/// Upstream page format, selecting the parser implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    /// Public guest job search (HTML cards)
    #[default]
    LinkedinGuest,
    /// JSON feed `{ jobs: [...], has_more }`
    JsonFeed,
}

impl std::str::FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linkedin-guest" => Ok(Self::LinkedinGuest),
            "json-feed" => Ok(Self::JsonFeed),
            other => Err(format!("unknown source format: {other}")),
        }
    }
}

/// Configuration for a scrape run.
///
/// Every field has a default, so partial JSON documents deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Cities to search (ordered set)
    pub cities: IndexSet<String>,

    /// Job titles to search (ordered set)
    pub positions: IndexSet<String>,

    /// Maximum new records per (city, position). Default: 1000.
    pub max_jobs_per_target: usize,

    /// Retries per request after the first attempt. Default: 5.
    pub max_retries: u32,

    /// Minimum spacing between requests to one host. Default: 5.
    pub request_delay_seconds: u64,

    /// Backoff seed when the upstream throttles. Default: 15.
    pub rate_limit_delay_seconds: u64,

    /// Results requested per search page from sources that take a page size
    /// (`json-feed`). Default: 25.
    pub page_size: usize,

    /// Targets scraped at once; all share one rate budget. Default: 2.
    pub max_concurrent_targets: usize,

    /// Fetch each new listing's page for seniority, type and industry.
    pub fetch_listing_details: bool,

    /// Fetch company pages for size and industry.
    pub fetch_company_details: bool,

    /// Record the result counts the upstream reports for each target, for
    /// sources that publish them. Default: true.
    pub fetch_total_counts: bool,

    pub source_format: SourceFormat,

    /// Override of the parser's default upstream base URL
    pub base_url: Option<String>,

    pub user_agent: String,

    pub request_timeout_seconds: u64,

    /// Substrings of a 2xx body that mean "blocked"
    pub block_markers: Vec<String>,

    /// Root of the dataset tree
    pub data_dir: PathBuf,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            cities: IndexSet::new(),
            positions: IndexSet::new(),
            max_jobs_per_target: 1000,
            max_retries: 5,
            request_delay_seconds: 5,
            rate_limit_delay_seconds: 15,
            page_size: 25,
            max_concurrent_targets: 2,
            fetch_listing_details: true,
            fetch_company_details: false,
            fetch_total_counts: true,
            source_format: SourceFormat::default(),
            base_url: None,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36".to_string(),
            request_timeout_seconds: 30,
            block_markers: vec!["authwall".to_string(), "/checkpoint/challenge".to_string()],
            data_dir: PathBuf::from("data/raw/JobData"),
        }
    }
}

impl ScrapeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cities(mut self, cities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cities = cities.into_iter().map(|c| c.into().trim().to_string()).collect();
        self
    }

    pub fn with_positions(mut self, positions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.positions = positions
            .into_iter()
            .map(|p| p.into().trim().to_string())
            .collect();
        self
    }

    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs_per_target = max_jobs;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_concurrency(mut self, targets: usize) -> Self {
        self.max_concurrent_targets = targets;
        self
    }

    pub fn with_delays(mut self, request_delay_seconds: u64, rate_limit_delay_seconds: u64) -> Self {
        self.request_delay_seconds = request_delay_seconds;
        self.rate_limit_delay_seconds = rate_limit_delay_seconds;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_listing_details(mut self, enabled: bool) -> Self {
        self.fetch_listing_details = enabled;
        self
    }

    pub fn with_company_details(mut self, enabled: bool) -> Self {
        self.fetch_company_details = enabled;
        self
    }

    pub fn with_total_counts(mut self, enabled: bool) -> Self {
        self.fetch_total_counts = enabled;
        self
    }

    pub fn with_source(mut self, format: SourceFormat, base_url: Option<String>) -> Self {
        self.source_format = format;
        self.base_url = base_url;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs(self.request_delay_seconds)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_secs(self.rate_limit_delay_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Reject configurations that must not start a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cities.is_empty() {
            return Err(ConfigError::NoCities);
        }
        if self.positions.is_empty() {
            return Err(ConfigError::NoPositions);
        }
        for city in &self.cities {
            validate_name("city", city)?;
        }
        for position in &self.positions {
            validate_name("position", position)?;
        }

        at_least("max_jobs_per_target", self.max_jobs_per_target as u64, 1)?;
        at_least("page_size", self.page_size as u64, 1)?;
        at_least("max_concurrent_targets", self.max_concurrent_targets as u64, 1)?;
        at_least("request_delay_seconds", self.request_delay_seconds, 1)?;

        if self.max_retries > 20 {
            return Err(ConfigError::InvalidLimit {
                field: "max_retries",
                value: self.max_retries as u64,
                reason: "must be at most 20",
            });
        }
        if self.rate_limit_delay_seconds < self.request_delay_seconds {
            return Err(ConfigError::InvalidLimit {
                field: "rate_limit_delay_seconds",
                value: self.rate_limit_delay_seconds,
                reason: "must not be shorter than request_delay_seconds",
            });
        }

        if self.source_format == SourceFormat::JsonFeed && self.base_url.is_none() {
            return Err(ConfigError::MissingBaseUrl { format: "json-feed" });
        }

        Ok(())
    }

    /// Expand the search space, position-major.
    pub fn targets(&self) -> Vec<ScrapeTarget> {
        self.positions
            .iter()
            .flat_map(|position| {
                self.cities
                    .iter()
                    .map(move |city| ScrapeTarget::new(city, position, self.max_jobs_per_target))
            })
            .collect()
    }
}

fn validate_name(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidName {
        field,
        value: value.to_string(),
        reason,
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if trimmed.contains(['/', '\\']) {
        return Err(invalid("must not contain path separators"));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(invalid("must not be a relative path"));
    }
    if trimmed.starts_with('_') {
        return Err(invalid("must not start with an underscore"));
    }
    if trimmed == TOTAL_JOBS {
        return Err(invalid("is reserved for the aggregate dataset"));
    }
    Ok(())
}

fn at_least(field: &'static str, value: u64, min: u64) -> Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::InvalidLimit {
            field,
            value,
            reason: "must be at least 1",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ScrapeConfig {
        ScrapeConfig::new()
            .with_cities(["Toronto", "Ottawa"])
            .with_positions(["Software Engineer"])
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ScrapeConfig::default();
        assert_eq!(config.max_jobs_per_target, 1000);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.request_delay_seconds, 5);
        assert_eq!(config.rate_limit_delay_seconds, 15);
        assert!(config.fetch_total_counts);
    }

    #[test]
    fn test_validate_requires_cities_and_positions() {
        assert_eq!(
            ScrapeConfig::new().with_positions(["Dev"]).validate(),
            Err(ConfigError::NoCities)
        );
        assert_eq!(
            ScrapeConfig::new().with_cities(["Toronto"]).validate(),
            Err(ConfigError::NoPositions)
        );
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_path_like_names() {
        for bad in ["a/b", "..", "_runs", "TotalJobs", "  "] {
            let config = valid().with_cities([bad]);
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidName { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        assert!(valid().with_max_jobs(0).validate().is_err());
        assert!(valid().with_page_size(0).validate().is_err());
        assert!(valid().with_concurrency(0).validate().is_err());
        assert!(valid().with_delays(5, 1).validate().is_err());
        assert!(valid().with_max_retries(50).validate().is_err());
    }

    #[test]
    fn test_json_feed_requires_base_url() {
        let config = valid().with_source(SourceFormat::JsonFeed, None);
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingBaseUrl { format: "json-feed" })
        );

        let config = valid().with_source(SourceFormat::JsonFeed, Some("http://localhost:8080/jobs".into()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_targets_are_position_major_and_deduplicated() {
        let config = ScrapeConfig::new()
            .with_cities(["Toronto", "Ottawa", "Toronto"])
            .with_positions(["Dev", "Intern"]);

        let labels: Vec<String> = config.targets().iter().map(|t| t.to_string()).collect();
        assert_eq!(
            labels,
            vec!["Dev in Toronto", "Dev in Ottawa", "Intern in Toronto", "Intern in Ottawa"]
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ScrapeConfig =
            serde_json::from_str(r#"{"cities": ["Calgary"], "source_format": "json-feed"}"#).unwrap();
        assert_eq!(config.cities.len(), 1);
        assert_eq!(config.source_format, SourceFormat::JsonFeed);
        assert_eq!(config.page_size, 25);
    }
}
