//! Job records and their categorical fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::posted::normalize_posted_at;

/// One observed posting at scrape time.
///
/// Field order is the persisted column order; see [`JobRecord::HEADERS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Source-assigned stable identifier (dedup key)
    pub job_id: String,
    pub title: String,
    pub company_name: String,
    pub company_size_category: CompanySize,
    pub company_industry: String,
    /// Canonical search city of the target that observed this posting
    pub location_city: String,
    pub seniority_level: SeniorityLevel,
    pub employment_type: EmploymentType,
    /// Absolute posting time, never later than `scraped_at`
    pub posted_at: DateTime<Utc>,
    /// When the orchestrator first observed the posting
    pub scraped_at: DateTime<Utc>,
    pub source_url: String,
}

impl JobRecord {
    /// Column set of every persisted dataset, in order.
    pub const HEADERS: [&'static str; 11] = [
        "job_id",
        "title",
        "company_name",
        "company_size_category",
        "company_industry",
        "location_city",
        "seniority_level",
        "employment_type",
        "posted_at",
        "scraped_at",
        "source_url",
    ];

    /// Industry label used for bucketing; empty values count as `unknown`.
    pub fn industry_label(&self) -> &str {
        label_or_unknown(&self.company_industry)
    }
}

pub(crate) fn label_or_unknown(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        "unknown"
    } else {
        trimmed
    }
}

/// Company headcount bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CompanySize {
    Micro,
    Small,
    Medium,
    Large,
    Enterprise,
    #[default]
    Unknown,
}

impl CompanySize {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Micro => "micro",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Enterprise => "enterprise",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a canonical name or a headcount label such as `"51-200 employees"`.
    ///
    /// The upper bound of the range decides the bucket: up to 10 is micro, 50
    /// small, 500 medium, 5,000 large, anything above enterprise.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "micro" => return Self::Micro,
            "small" => return Self::Small,
            "medium" => return Self::Medium,
            "large" => return Self::Large,
            "enterprise" => return Self::Enterprise,
            _ => {}
        }

        let without_separators = normalized.replace(',', "");
        let upper = without_separators
            .split(|c: char| !c.is_ascii_digit())
            .filter(|run| !run.is_empty())
            .filter_map(|run| run.parse::<u64>().ok())
            .last();

        match upper {
            Some(0) | None => Self::Unknown,
            Some(n) if n <= 10 => Self::Micro,
            Some(n) if n <= 50 => Self::Small,
            Some(n) if n <= 500 => Self::Medium,
            Some(n) if n <= 5_000 => Self::Large,
            Some(_) => Self::Enterprise,
        }
    }
}

impl From<String> for CompanySize {
    fn from(value: String) -> Self {
        Self::from_label(&value)
    }
}

impl From<CompanySize> for String {
    fn from(value: CompanySize) -> Self {
        value.as_str().to_string()
    }
}

/// Seniority level as reported by the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SeniorityLevel {
    Internship,
    EntryLevel,
    Associate,
    MidSenior,
    Director,
    Executive,
    NotApplicable,
    #[default]
    Unknown,
}

impl SeniorityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internship => "internship",
            Self::EntryLevel => "entry-level",
            Self::Associate => "associate",
            Self::MidSenior => "mid-senior",
            Self::Director => "director",
            Self::Executive => "executive",
            Self::NotApplicable => "not-applicable",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a canonical name or a source label such as `"Mid-Senior level"`.
    pub fn from_label(label: &str) -> Self {
        let normalized = label
            .trim()
            .to_ascii_lowercase()
            .replace(['-', '_'], " ");
        let normalized = normalized.trim_end_matches(" level").trim();

        match normalized {
            "internship" | "intern" => Self::Internship,
            "entry" | "entry level" | "junior" => Self::EntryLevel,
            "associate" => Self::Associate,
            "mid senior" | "mid" | "senior" => Self::MidSenior,
            "director" => Self::Director,
            "executive" => Self::Executive,
            "not applicable" | "n/a" => Self::NotApplicable,
            _ => Self::Unknown,
        }
    }
}

impl From<String> for SeniorityLevel {
    fn from(value: String) -> Self {
        Self::from_label(&value)
    }
}

impl From<SeniorityLevel> for String {
    fn from(value: SeniorityLevel) -> Self {
        value.as_str().to_string()
    }
}

/// Employment type of the posting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EmploymentType {
    FullTime,
    PartTime,
    Contract,
    Internship,
    /// Recognized but outside the tracked categories (temporary, volunteer, ...)
    Other,
    #[default]
    Unknown,
}

impl EmploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullTime => "full-time",
            Self::PartTime => "part-time",
            Self::Contract => "contract",
            Self::Internship => "internship",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a canonical name or a source label such as `"Full-time"`.
    pub fn from_label(label: &str) -> Self {
        let compact: String = label
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        match compact.as_str() {
            "fulltime" => Self::FullTime,
            "parttime" => Self::PartTime,
            "contract" | "contractor" => Self::Contract,
            "internship" | "intern" => Self::Internship,
            "other" | "temporary" | "temp" | "volunteer" | "seasonal" | "freelance" => Self::Other,
            _ => Self::Unknown,
        }
    }
}

impl From<String> for EmploymentType {
    fn from(value: String) -> Self {
        Self::from_label(&value)
    }
}

impl From<EmploymentType> for String {
    fn from(value: EmploymentType) -> Self {
        value.as_str().to_string()
    }
}

/// A partially-extracted posting as produced by a parser.
///
/// All fields are raw source values; the orchestrator validates and
/// normalizes them into a [`JobRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateJob {
    pub job_id: Option<String>,
    pub title: Option<String>,
    pub company_name: Option<String>,
    pub company_size: Option<String>,
    pub company_industry: Option<String>,
    pub location: Option<String>,
    pub seniority: Option<String>,
    pub employment_type: Option<String>,
    /// Raw posting time: RFC 3339, `YYYY-MM-DD`, or relative ("2 days ago")
    pub posted: Option<String>,
    pub source_url: Option<String>,
    /// Company page used for optional enrichment
    pub company_url: Option<String>,
}

impl CandidateJob {
    /// Identifier used for deduplication: explicit id, else derived from the URL.
    pub fn resolved_id(&self) -> Option<String> {
        non_empty(self.job_id.as_deref())
            .map(str::to_string)
            .or_else(|| self.source_url.as_deref().and_then(derive_job_id))
    }

    /// Validate and normalize into a record.
    ///
    /// Returns `None` when the candidate has no usable id or no title.
    pub fn into_record(self, city: &str, scraped_at: DateTime<Utc>) -> Option<JobRecord> {
        let job_id = self.resolved_id()?;
        let title = non_empty(self.title.as_deref())?.to_string();

        let posted_at = self
            .posted
            .as_deref()
            .and_then(|raw| normalize_posted_at(raw, scraped_at))
            .unwrap_or(scraped_at);

        Some(JobRecord {
            job_id,
            title,
            company_name: clean(self.company_name),
            company_size_category: self
                .company_size
                .as_deref()
                .map(CompanySize::from_label)
                .unwrap_or_default(),
            company_industry: clean(self.company_industry),
            location_city: city.to_string(),
            seniority_level: self
                .seniority
                .as_deref()
                .map(SeniorityLevel::from_label)
                .unwrap_or_default(),
            employment_type: self
                .employment_type
                .as_deref()
                .map(EmploymentType::from_label)
                .unwrap_or_default(),
            posted_at,
            scraped_at,
            source_url: clean(self.source_url),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn clean(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Derive a stable id from a listing URL (query and fragment ignored).
///
/// SHA-256 of the normalized URL, first 16 hex characters.
pub fn derive_job_id(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized = match url::Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => trimmed.to_string(),
    };

    let digest = Sha256::digest(normalized.as_bytes());
    Some(hex::encode(digest)[..16].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, h, 0, 0).unwrap()
    }

    #[test]
    fn test_company_size_from_headcount_labels() {
        assert_eq!(CompanySize::from_label("2-10 employees"), CompanySize::Micro);
        assert_eq!(CompanySize::from_label("11-50 employees"), CompanySize::Small);
        assert_eq!(CompanySize::from_label("51-200 employees"), CompanySize::Medium);
        assert_eq!(CompanySize::from_label("1,001-5,000 employees"), CompanySize::Large);
        assert_eq!(CompanySize::from_label("10,001+ employees"), CompanySize::Enterprise);
        assert_eq!(CompanySize::from_label("enterprise"), CompanySize::Enterprise);
        assert_eq!(CompanySize::from_label(""), CompanySize::Unknown);
        assert_eq!(CompanySize::from_label("lots"), CompanySize::Unknown);
    }

    #[test]
    fn test_derived_id_ignores_tracking() {
        let id = derive_job_id("https://jobs.example.com/view/42?trk=feed#apply").unwrap();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(derive_job_id("https://jobs.example.com/view/42").as_deref(), Some(id.as_str()));
        assert_ne!(derive_job_id("https://jobs.example.com/view/43").as_deref(), Some(id.as_str()));
        assert_eq!(derive_job_id("   "), None);
    }

    #[test]
    fn test_seniority_labels() {
        assert_eq!(SeniorityLevel::from_label("Mid-Senior level"), SeniorityLevel::MidSenior);
        assert_eq!(SeniorityLevel::from_label("Entry level"), SeniorityLevel::EntryLevel);
        assert_eq!(SeniorityLevel::from_label("entry-level"), SeniorityLevel::EntryLevel);
        assert_eq!(SeniorityLevel::from_label("Not Applicable"), SeniorityLevel::NotApplicable);
        assert_eq!(SeniorityLevel::from_label("Wizard"), SeniorityLevel::Unknown);
    }

    #[test]
    fn test_employment_type_labels() {
        assert_eq!(EmploymentType::from_label("Full-time"), EmploymentType::FullTime);
        assert_eq!(EmploymentType::from_label("part-time"), EmploymentType::PartTime);
        assert_eq!(EmploymentType::from_label("Temporary"), EmploymentType::Other);
        assert_eq!(EmploymentType::from_label(""), EmploymentType::Unknown);
    }

    #[test]
    fn test_canonical_names_round_trip_through_labels() {
        for size in [CompanySize::Micro, CompanySize::Large, CompanySize::Unknown] {
            assert_eq!(CompanySize::from_label(size.as_str()), size);
        }
        for level in [SeniorityLevel::MidSenior, SeniorityLevel::NotApplicable] {
            assert_eq!(SeniorityLevel::from_label(level.as_str()), level);
        }
        for kind in [EmploymentType::FullTime, EmploymentType::Other] {
            assert_eq!(EmploymentType::from_label(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_candidate_without_title_is_invalid() {
        let candidate = CandidateJob {
            job_id: Some("1".into()),
            title: Some("   ".into()),
            ..Default::default()
        };
        assert!(candidate.into_record("Toronto", at(12)).is_none());
    }

    #[test]
    fn test_candidate_id_falls_back_to_url_hash() {
        let a = CandidateJob {
            title: Some("Engineer".into()),
            source_url: Some("https://jobs.example.com/view/42?trk=abc".into()),
            ..Default::default()
        };
        let b = CandidateJob {
            title: Some("Engineer".into()),
            source_url: Some("https://jobs.example.com/view/42?trk=other".into()),
            ..Default::default()
        };

        let id_a = a.resolved_id().unwrap();
        assert_eq!(id_a.len(), 16);
        assert_eq!(Some(id_a), b.resolved_id());
    }

    #[test]
    fn test_candidate_into_record_normalizes_fields() {
        let scraped_at = at(12);
        let record = CandidateJob {
            job_id: Some(" 123 ".into()),
            title: Some("Software Engineer".into()),
            company_name: Some(" Acme ".into()),
            company_size: Some("51-200 employees".into()),
            seniority: Some("Entry level".into()),
            employment_type: Some("Full-time".into()),
            posted: Some("2 hours ago".into()),
            location: Some("Toronto, Ontario, Canada".into()),
            ..Default::default()
        }
        .into_record("Toronto", scraped_at)
        .unwrap();

        assert_eq!(record.job_id, "123");
        assert_eq!(record.company_name, "Acme");
        assert_eq!(record.company_size_category, CompanySize::Medium);
        assert_eq!(record.seniority_level, SeniorityLevel::EntryLevel);
        assert_eq!(record.employment_type, EmploymentType::FullTime);
        assert_eq!(record.posted_at, at(10));
        assert_eq!(record.location_city, "Toronto");
        assert_eq!(record.industry_label(), "unknown");
    }

    #[test]
    fn test_candidate_with_out_of_range_posting_keeps_scrape_time() {
        let scraped_at = at(12);
        let record = CandidateJob {
            job_id: Some("9".into()),
            title: Some("Archivist".into()),
            posted: Some("99999999999999 weeks ago".into()),
            ..Default::default()
        }
        .into_record("Ottawa", scraped_at)
        .unwrap();

        assert_eq!(record.posted_at, scraped_at);
    }
}
