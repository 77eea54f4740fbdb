//! Upstream-reported result counts and their dated history.
//!
//! Search pages of some sources state how many postings match a query in
//! each posting-age window. Those numbers cover far more than the records a
//! run actually collects, so they are kept as a separate per-position
//! history with one row per (date, city).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::pipeline::trends::TimeWindow;

/// Result counts the upstream reports for one search, by posting age.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamCounts {
    pub past_24h: Option<u64>,
    pub past_week: Option<u64>,
    pub past_month: Option<u64>,
    pub any_time: Option<u64>,
}

impl UpstreamCounts {
    /// No window was reported.
    pub fn is_empty(&self) -> bool {
        self.past_24h.is_none()
            && self.past_week.is_none()
            && self.past_month.is_none()
            && self.any_time.is_none()
    }

    pub fn get(&self, window: TimeWindow) -> Option<u64> {
        match window {
            TimeWindow::Day => self.past_24h,
            TimeWindow::Week => self.past_week,
            TimeWindow::Month => self.past_month,
            TimeWindow::All => self.any_time,
        }
    }
}

/// One city's upstream counts as observed on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSnapshot {
    pub date: NaiveDate,
    pub city: String,
    pub past_24h: Option<u64>,
    pub past_week: Option<u64>,
    pub past_month: Option<u64>,
    pub any_time: Option<u64>,
}

impl CountSnapshot {
    /// Column order of persisted count histories.
    pub const HEADERS: [&'static str; 6] = ["date", "city", "past_24h", "past_week", "past_month", "any_time"];

    pub fn new(date: NaiveDate, city: impl Into<String>, counts: UpstreamCounts) -> Self {
        Self {
            date,
            city: city.into(),
            past_24h: counts.past_24h,
            past_week: counts.past_week,
            past_month: counts.past_month,
            any_time: counts.any_time,
        }
    }

    pub fn counts(&self) -> UpstreamCounts {
        UpstreamCounts {
            past_24h: self.past_24h,
            past_week: self.past_week,
            past_month: self.past_month,
            any_time: self.any_time,
        }
    }
}

/// Add `snapshots` to a history.
///
/// A snapshot replaces an existing row for the same date and city, so a
/// second run on one day keeps only its latest numbers. The result is
/// ordered by date, then city.
pub fn merge_snapshots(
    history: Vec<CountSnapshot>,
    snapshots: impl IntoIterator<Item = CountSnapshot>,
) -> Vec<CountSnapshot> {
    let mut rows: BTreeMap<(NaiveDate, String), CountSnapshot> = history
        .into_iter()
        .map(|row| ((row.date, row.city.clone()), row))
        .collect();
    for row in snapshots {
        rows.insert((row.date, row.city.clone()), row);
    }
    rows.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn counts(total: u64) -> UpstreamCounts {
        UpstreamCounts {
            any_time: Some(total),
            ..Default::default()
        }
    }

    #[test]
    fn test_window_lookup() {
        let counts = UpstreamCounts {
            past_24h: Some(3),
            past_week: Some(20),
            past_month: None,
            any_time: Some(400),
        };

        assert_eq!(counts.get(TimeWindow::Day), Some(3));
        assert_eq!(counts.get(TimeWindow::Week), Some(20));
        assert_eq!(counts.get(TimeWindow::Month), None);
        assert_eq!(counts.get(TimeWindow::All), Some(400));
        assert!(!counts.is_empty());
        assert!(UpstreamCounts::default().is_empty());
    }

    #[test]
    fn test_merge_replaces_same_day_and_sorts() {
        let history = vec![
            CountSnapshot::new(day(2), "Toronto", counts(120)),
            CountSnapshot::new(day(1), "Toronto", counts(100)),
        ];

        let merged = merge_snapshots(
            history,
            [
                CountSnapshot::new(day(2), "Toronto", counts(125)),
                CountSnapshot::new(day(2), "Ottawa", counts(40)),
            ],
        );

        let rows: Vec<_> = merged
            .iter()
            .map(|r| (r.date, r.city.as_str(), r.any_time))
            .collect();
        assert_eq!(
            rows,
            vec![
                (day(1), "Toronto", Some(100)),
                (day(2), "Ottawa", Some(40)),
                (day(2), "Toronto", Some(125)),
            ]
        );
    }
}
