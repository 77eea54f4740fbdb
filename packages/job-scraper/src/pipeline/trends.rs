//! Read-time trend computation over datasets.
//!
//! Everything here is a pure function of the records passed in. The
//! reference "now" is the latest `scraped_at` of those records, so results
//! do not drift with wall-clock time between runs.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::types::counts::CountSnapshot;
use crate::types::job::JobRecord;

/// Time window over `posted_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    #[serde(rename = "24h")]
    Day,
    Week,
    Month,
    #[default]
    All,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 4] = [Self::Day, Self::Week, Self::Month, Self::All];

    /// Window length, `None` for [`TimeWindow::All`].
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Day => Some(Duration::hours(24)),
            Self::Week => Some(Duration::days(7)),
            Self::Month => Some(Duration::days(30)),
            Self::All => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "24h",
            Self::Week => "week",
            Self::Month => "month",
            Self::All => "all",
        }
    }

    /// Whether a record posted at `posted_at` falls in the window ending at `now`.
    pub fn contains(&self, posted_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.duration() {
            Some(length) => posted_at >= now - length,
            None => true,
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "24h" | "day" | "1d" => Ok(Self::Day),
            "week" | "7d" => Ok(Self::Week),
            "month" | "30d" => Ok(Self::Month),
            "all" => Ok(Self::All),
            other => Err(format!("unknown time window: {other} (expected 24h, week, month or all)")),
        }
    }
}

/// Categorical breakdown of the records in one window.
///
/// Every breakdown sums to `total`; missing values are counted under
/// `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub window: TimeWindow,
    /// Reference time (latest `scraped_at`), `None` for an empty dataset
    pub reference: Option<DateTime<Utc>>,
    pub total: usize,
    pub by_city: BTreeMap<String, usize>,
    pub by_seniority: BTreeMap<String, usize>,
    pub by_employment_type: BTreeMap<String, usize>,
    pub by_industry: BTreeMap<String, usize>,
    pub by_company_size: BTreeMap<String, usize>,
}

impl TrendSummary {
    fn empty(window: TimeWindow, reference: Option<DateTime<Utc>>) -> Self {
        Self {
            window,
            reference,
            total: 0,
            by_city: BTreeMap::new(),
            by_seniority: BTreeMap::new(),
            by_employment_type: BTreeMap::new(),
            by_industry: BTreeMap::new(),
            by_company_size: BTreeMap::new(),
        }
    }

    /// Check that every breakdown sums to `total`.
    pub fn reconciles(&self) -> bool {
        [
            &self.by_city,
            &self.by_seniority,
            &self.by_employment_type,
            &self.by_industry,
            &self.by_company_size,
        ]
        .iter()
        .all(|breakdown| breakdown.values().sum::<usize>() == self.total)
    }
}

/// Latest `scraped_at` of a record set.
pub fn reference_time(records: &[JobRecord]) -> Option<DateTime<Utc>> {
    records.iter().map(|r| r.scraped_at).max()
}

/// Records of `records` that fall in `window`.
pub fn in_window(records: &[JobRecord], window: TimeWindow) -> Vec<&JobRecord> {
    let Some(now) = reference_time(records) else {
        return Vec::new();
    };
    records
        .iter()
        .filter(|r| window.contains(r.posted_at, now))
        .collect()
}

/// Count records in `window` by city, seniority, employment type, industry
/// and company size.
pub fn summarize(records: &[JobRecord], window: TimeWindow) -> TrendSummary {
    let mut summary = TrendSummary::empty(window, reference_time(records));

    for record in in_window(records, window) {
        summary.total += 1;
        bump(&mut summary.by_city, label(&record.location_city));
        bump(&mut summary.by_seniority, record.seniority_level.as_str());
        bump(&mut summary.by_employment_type, record.employment_type.as_str());
        bump(&mut summary.by_industry, record.industry_label());
        bump(&mut summary.by_company_size, record.company_size_category.as_str());
    }

    summary
}

fn bump(map: &mut BTreeMap<String, usize>, key: &str) {
    *map.entry(key.to_string()).or_insert(0) += 1;
}

fn label(value: &str) -> &str {
    crate::types::job::label_or_unknown(value)
}

/// One city's row in the comparison table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityCounts {
    pub city: String,
    pub last_24h: usize,
    pub last_week: usize,
    pub last_month: usize,
    pub total: usize,
    /// Records first seen on the most recent scrape date
    pub new_in_latest_run: usize,
}

/// Per-city window counts, largest city first.
///
/// All cities share the dataset-wide reference time.
pub fn city_comparison(records: &[JobRecord]) -> Vec<CityCounts> {
    let Some(now) = reference_time(records) else {
        return Vec::new();
    };
    let latest_date = now.date_naive();

    let mut rows: BTreeMap<&str, CityCounts> = BTreeMap::new();
    for record in records {
        let city = label(&record.location_city);
        let row = rows.entry(city).or_insert_with(|| CityCounts {
            city: city.to_string(),
            last_24h: 0,
            last_week: 0,
            last_month: 0,
            total: 0,
            new_in_latest_run: 0,
        });

        row.total += 1;
        if TimeWindow::Day.contains(record.posted_at, now) {
            row.last_24h += 1;
        }
        if TimeWindow::Week.contains(record.posted_at, now) {
            row.last_week += 1;
        }
        if TimeWindow::Month.contains(record.posted_at, now) {
            row.last_month += 1;
        }
        if record.scraped_at.date_naive() == latest_date {
            row.new_in_latest_run += 1;
        }
    }

    let mut rows: Vec<CityCounts> = rows.into_values().collect();
    rows.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.city.cmp(&b.city)));
    rows
}

/// Records first seen on one scrape date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub new_records: usize,
    /// Records seen on or before `date`
    pub cumulative: usize,
}

/// Per-date growth of a dataset, optionally restricted to one city.
pub fn daily_history(records: &[JobRecord], city: Option<&str>) -> Vec<DailyCount> {
    let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for record in records {
        if city.is_some_and(|c| record.location_city != c) {
            continue;
        }
        *per_day.entry(record.scraped_at.date_naive()).or_insert(0) += 1;
    }

    let mut cumulative = 0;
    per_day
        .into_iter()
        .map(|(date, new_records)| {
            cumulative += new_records;
            DailyCount {
                date,
                new_records,
                cumulative,
            }
        })
        .collect()
}

/// One date of an upstream count history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountPoint {
    pub date: NaiveDate,
    pub count: u64,
    /// Change since the previous point, `None` for the first
    pub delta: Option<i64>,
}

/// Upstream counts for `window` by date, oldest first.
///
/// With a city, that city's snapshots; without one, the sum over every city
/// reported on a date. Snapshots that did not report the window are skipped.
pub fn count_history(snapshots: &[CountSnapshot], city: Option<&str>, window: TimeWindow) -> Vec<CountPoint> {
    let mut per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for snapshot in snapshots {
        if city.is_some_and(|c| snapshot.city != c) {
            continue;
        }
        if let Some(count) = snapshot.counts().get(window) {
            let total = per_day.entry(snapshot.date).or_insert(0);
            *total = total.saturating_add(count);
        }
    }

    let mut previous: Option<u64> = None;
    per_day
        .into_iter()
        .map(|(date, count)| {
            let delta = previous.map(|p| count as i64 - p as i64);
            previous = Some(count);
            CountPoint { date, count, delta }
        })
        .collect()
}

/// A city's most recent upstream count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestCount {
    pub city: String,
    pub date: NaiveDate,
    pub count: u64,
    /// Change since the city's previous snapshot
    pub delta: Option<i64>,
}

/// Each city's latest upstream count for `window`, largest first.
pub fn latest_counts(snapshots: &[CountSnapshot], window: TimeWindow) -> Vec<LatestCount> {
    let cities: std::collections::BTreeSet<&str> = snapshots.iter().map(|s| s.city.as_str()).collect();

    let mut rows: Vec<LatestCount> = cities
        .into_iter()
        .filter_map(|city| {
            let last = count_history(snapshots, Some(city), window).pop()?;
            Some(LatestCount {
                city: city.to_string(),
                date: last.date,
                count: last.count,
                delta: last.delta,
            })
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.city.cmp(&b.city)));
    rows
}
