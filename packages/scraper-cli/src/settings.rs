//! Layered run configuration.
//!
//! Built-in defaults, then an optional JSON file, then `JOB_SCRAPER_*`
//! environment variables (a `.env` file is honoured), then command-line flags.

use anyhow::{bail, Context, Result};
use clap::Args;
use job_scraper::{ScrapeConfig, SourceFormat};
use std::path::{Path, PathBuf};

/// Cities searched when nothing else is configured.
pub const DEFAULT_CITIES: [&str; 6] = ["Ottawa", "Toronto", "Montreal", "Vancouver", "Calgary", "Edmonton"];

/// Positions searched when nothing else is configured.
pub const DEFAULT_POSITIONS: [&str; 2] = ["Software Engineer", "Internship"];

/// Command-line overrides, applied last.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// City to search (repeatable; replaces the configured list)
    #[arg(long = "city")]
    pub cities: Vec<String>,

    /// Position to search (repeatable; replaces the configured list)
    #[arg(long = "position")]
    pub positions: Vec<String>,

    /// Maximum new records per (city, position)
    #[arg(long)]
    pub max_jobs: Option<usize>,

    /// Targets scraped at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Skip fetching listing pages
    #[arg(long)]
    pub no_details: bool,

    /// Also fetch company pages
    #[arg(long)]
    pub company_details: bool,

    /// Skip recording upstream result counts
    #[arg(long)]
    pub no_counts: bool,

    /// Upstream format: linkedin-guest or json-feed
    #[arg(long)]
    pub format: Option<SourceFormat>,

    /// Upstream base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Set from the global `--data-dir` flag
    #[arg(skip)]
    pub data_dir: Option<PathBuf>,
}

impl Overrides {
    fn apply(&self, config: &mut ScrapeConfig) {
        if !self.cities.is_empty() {
            *config = config.clone().with_cities(self.cities.iter().cloned());
        }
        if !self.positions.is_empty() {
            *config = config.clone().with_positions(self.positions.iter().cloned());
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(max_jobs) = self.max_jobs {
            config.max_jobs_per_target = max_jobs;
        }
        if let Some(concurrency) = self.concurrency {
            config.max_concurrent_targets = concurrency;
        }
        if self.no_details {
            config.fetch_listing_details = false;
        }
        if self.company_details {
            config.fetch_company_details = true;
        }
        if self.no_counts {
            config.fetch_total_counts = false;
        }
        if let Some(format) = self.format {
            config.source_format = format;
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(base_url.clone());
        }
    }
}

/// Library defaults plus the default search space.
pub fn defaults() -> ScrapeConfig {
    ScrapeConfig::new()
        .with_cities(DEFAULT_CITIES)
        .with_positions(DEFAULT_POSITIONS)
}

/// Resolve the configuration for this invocation.
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<ScrapeConfig> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let mut config = defaults();
    if let Some(path) = path {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        config = apply_file(config, &contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
    }
    apply_env(&mut config, |name| std::env::var(name).ok())?;
    overrides.apply(&mut config);

    Ok(config)
}

/// Overlay the keys present in a JSON object onto `base`.
fn apply_file(base: ScrapeConfig, contents: &str) -> Result<ScrapeConfig> {
    let file: serde_json::Value = serde_json::from_str(contents)?;
    let serde_json::Value::Object(fields) = file else {
        bail!("config file must contain a JSON object");
    };

    let mut merged = serde_json::to_value(&base)?;
    if let serde_json::Value::Object(map) = &mut merged {
        map.extend(fields);
    }
    Ok(serde_json::from_value(merged)?)
}

fn apply_env(config: &mut ScrapeConfig, var: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(cities) = var("JOB_SCRAPER_CITIES") {
        *config = config.clone().with_cities(split_list(&cities));
    }
    if let Some(positions) = var("JOB_SCRAPER_POSITIONS") {
        *config = config.clone().with_positions(split_list(&positions));
    }
    if let Some(dir) = var("JOB_SCRAPER_DATA_DIR") {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(max_jobs) = var("JOB_SCRAPER_MAX_JOBS") {
        config.max_jobs_per_target = max_jobs
            .trim()
            .parse()
            .context("JOB_SCRAPER_MAX_JOBS must be a valid number")?;
    }
    if let Some(concurrency) = var("JOB_SCRAPER_CONCURRENCY") {
        config.max_concurrent_targets = concurrency
            .trim()
            .parse()
            .context("JOB_SCRAPER_CONCURRENCY must be a valid number")?;
    }
    if let Some(source) = var("JOB_SCRAPER_SOURCE") {
        config.source_format = source
            .trim()
            .parse()
            .map_err(anyhow::Error::msg)
            .context("JOB_SCRAPER_SOURCE must be linkedin-guest or json-feed")?;
    }
    if let Some(base_url) = var("JOB_SCRAPER_BASE_URL") {
        config.base_url = Some(base_url);
    }
    Ok(())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = defaults();
        assert!(config.validate().is_ok());
        assert_eq!(config.targets().len(), 12);
    }

    #[test]
    fn test_file_overrides_only_given_keys() {
        let config = apply_file(defaults(), r#"{"cities": ["Halifax"], "max_jobs_per_target": 50}"#).unwrap();

        assert_eq!(config.cities.len(), 1);
        assert!(config.cities.contains("Halifax"));
        assert_eq!(config.max_jobs_per_target, 50);
        assert_eq!(config.positions.len(), 2);
        assert_eq!(config.request_delay_seconds, 5);
    }

    #[test]
    fn test_file_must_be_an_object() {
        assert!(apply_file(defaults(), "[1, 2]").is_err());
        assert!(apply_file(defaults(), r#"{"max_retries": "many"}"#).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = apply_file(defaults(), r#"{"max_concurrent_targets": 4}"#).unwrap();
        apply_env(
            &mut config,
            env(&[
                ("JOB_SCRAPER_CITIES", "Toronto, Ottawa,,"),
                ("JOB_SCRAPER_CONCURRENCY", "1"),
                ("JOB_SCRAPER_SOURCE", "json-feed"),
                ("JOB_SCRAPER_BASE_URL", "https://feed.example/jobs"),
            ]),
        )
        .unwrap();

        assert_eq!(config.cities.iter().collect::<Vec<_>>(), vec!["Toronto", "Ottawa"]);
        assert_eq!(config.max_concurrent_targets, 1);
        assert_eq!(config.source_format, SourceFormat::JsonFeed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_env_number_is_an_error() {
        let mut config = defaults();
        let err = apply_env(&mut config, env(&[("JOB_SCRAPER_MAX_JOBS", "lots")])).unwrap_err();
        assert!(err.to_string().contains("JOB_SCRAPER_MAX_JOBS"));
    }

    #[test]
    fn test_flags_win() {
        let mut config = defaults();
        apply_env(&mut config, env(&[("JOB_SCRAPER_MAX_JOBS", "10")])).unwrap();
        Overrides {
            positions: vec!["Data Analyst".to_string()],
            max_jobs: Some(20),
            no_details: true,
            no_counts: true,
            ..Default::default()
        }
        .apply(&mut config);

        assert_eq!(config.max_jobs_per_target, 20);
        assert_eq!(config.positions.iter().collect::<Vec<_>>(), vec!["Data Analyst"]);
        assert_eq!(config.cities.len(), DEFAULT_CITIES.len());
        assert!(!config.fetch_listing_details);
        assert!(!config.fetch_total_counts);
    }
}
