//! Normalization of source-reported posting times.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use regex::Regex;
use std::sync::LazyLock;

static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\+?\s*(second|sec|minute|min|hour|hr|day|week|month|year)s?\s+ago")
        .expect("relative time pattern is valid")
});

/// Convert a raw posting time into an absolute timestamp.
///
/// Accepts RFC 3339 timestamps, `YYYY-MM-DD` dates (midnight UTC) and relative
/// phrases ("3 days ago", "30+ days ago", "yesterday", "just now"). The result
/// is clamped to `scraped_at`. Returns `None` for anything unrecognized.
pub fn normalize_posted_at(raw: &str, scraped_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let absolute = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        });

    let resolved = absolute.or_else(|| relative_to(raw, scraped_at))?;
    Some(resolved.min(scraped_at))
}

fn relative_to(raw: &str, scraped_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("just now") || lower.contains("moments ago") || lower == "today" {
        return Some(scraped_at);
    }
    if lower.contains("yesterday") {
        return scraped_at.checked_sub_signed(TimeDelta::days(1));
    }

    let caps = RELATIVE.captures(&lower)?;
    let amount: i64 = caps.get(1)?.as_str().parse().ok()?;
    // Oversized amounts fall out of range instead of overflowing.
    let offset = match caps.get(2)?.as_str() {
        "second" | "sec" => TimeDelta::try_seconds(amount),
        "minute" | "min" => TimeDelta::try_minutes(amount),
        "hour" | "hr" => TimeDelta::try_hours(amount),
        "day" => TimeDelta::try_days(amount),
        "week" => TimeDelta::try_weeks(amount),
        "month" => amount.checked_mul(30).and_then(TimeDelta::try_days),
        "year" => amount.checked_mul(365).and_then(TimeDelta::try_days),
        _ => None,
    }?;

    scraped_at.checked_sub_signed(offset)
}
