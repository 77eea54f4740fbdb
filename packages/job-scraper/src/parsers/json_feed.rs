//! Parser for JSON job feeds.
//!
//! Search endpoint: `GET {base}?keywords=..&location=..&page=N&per_page=M`
//! returning `{ "jobs": [...], "has_more": bool }`. Listing and company URLs
//! return a single JSON object with the detail fields. Result counts come
//! from `GET {base}/counts?keywords=..&location=..`.

use serde::Deserialize;
use url::Url;

use crate::error::{ParseError, ParseResult};
use crate::traits::parser::{CompanyDetails, JobDetails, ListingParser, ParsedPage};
use crate::types::counts::UpstreamCounts;
use crate::types::job::CandidateJob;
use crate::types::page::Page;
use crate::types::target::ScrapeTarget;

#[derive(Debug, Deserialize)]
struct FeedPage {
    #[serde(default)]
    jobs: Vec<FeedJob>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeedJob {
    #[serde(alias = "job_id")]
    id: Option<serde_json::Value>,
    title: Option<String>,
    #[serde(alias = "company_name")]
    company: Option<String>,
    company_size: Option<String>,
    #[serde(alias = "company_industry", alias = "industries")]
    industry: Option<String>,
    location: Option<String>,
    #[serde(alias = "seniority_level")]
    seniority: Option<String>,
    employment_type: Option<String>,
    job_function: Option<String>,
    #[serde(alias = "posted", alias = "date_posted")]
    posted_at: Option<String>,
    #[serde(alias = "source_url", alias = "link")]
    url: Option<String>,
    company_url: Option<String>,
}

impl FeedJob {
    /// Ids may be strings or numbers.
    fn id(&self) -> Option<String> {
        match self.id.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn into_candidate(self) -> CandidateJob {
        CandidateJob {
            job_id: self.id(),
            title: self.title,
            company_name: self.company,
            company_size: self.company_size,
            company_industry: self.industry,
            location: self.location,
            seniority: self.seniority,
            employment_type: self.employment_type,
            posted: self.posted_at,
            source_url: self.url,
            company_url: self.company_url,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeedCompany {
    #[serde(alias = "company_size")]
    size: Option<String>,
    #[serde(alias = "industries")]
    industry: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeedCounts {
    #[serde(alias = "24h", alias = "last_24h")]
    past_24h: Option<u64>,
    #[serde(alias = "week", alias = "last_week")]
    past_week: Option<u64>,
    #[serde(alias = "month", alias = "last_month")]
    past_month: Option<u64>,
    #[serde(alias = "total", alias = "all")]
    any_time: Option<u64>,
}

/// [`ListingParser`] for the `json-feed` source format.
#[derive(Debug, Clone)]
pub struct JsonFeedParser {
    base_url: String,
    per_page: usize,
}

impl JsonFeedParser {
    pub fn new(base_url: impl Into<String>, per_page: usize) -> Self {
        Self {
            base_url: base_url.into(),
            per_page: per_page.max(1),
        }
    }

    fn decode<T: for<'de> Deserialize<'de>>(page: &Page) -> ParseResult<T> {
        serde_json::from_str(&page.body).map_err(|source| ParseError::Json {
            url: page.url.clone(),
            source,
        })
    }
}

impl ListingParser for JsonFeedParser {
    fn name(&self) -> &str {
        "json-feed"
    }

    fn page_size(&self) -> usize {
        self.per_page
    }

    fn search_url(&self, target: &ScrapeTarget, page_index: usize) -> String {
        let page = page_index.to_string();
        let per_page = self.per_page.to_string();
        match Url::parse_with_params(
            &self.base_url,
            &[
                ("keywords", target.position.as_str()),
                ("location", target.city.as_str()),
                ("page", page.as_str()),
                ("per_page", per_page.as_str()),
            ],
        ) {
            Ok(url) => url.to_string(),
            Err(_) => self.base_url.clone(),
        }
    }

    fn parse_search(&self, page: &Page) -> ParseResult<ParsedPage> {
        if !page.has_content() {
            return Ok(ParsedPage::empty());
        }

        let feed: FeedPage = Self::decode(page)?;
        let candidates = feed.jobs.into_iter().map(FeedJob::into_candidate).collect();
        Ok(ParsedPage::new(candidates, feed.has_more))
    }

    fn parse_listing(&self, page: &Page) -> ParseResult<JobDetails> {
        let job: FeedJob = Self::decode(page)?;
        Ok(JobDetails {
            seniority: job.seniority,
            employment_type: job.employment_type,
            job_function: job.job_function,
            industry: job.industry,
            company_url: job.company_url,
        })
    }

    fn parse_company(&self, page: &Page) -> ParseResult<CompanyDetails> {
        let company: FeedCompany = Self::decode(page)?;
        Ok(CompanyDetails {
            size: company.size,
            industry: company.industry,
        })
    }

    fn counts_url(&self, target: &ScrapeTarget) -> Option<String> {
        let base = format!("{}/counts", self.base_url.trim_end_matches('/'));
        Url::parse_with_params(
            &base,
            &[
                ("keywords", target.position.as_str()),
                ("location", target.city.as_str()),
            ],
        )
        .ok()
        .map(|url| url.to_string())
    }

    fn parse_total_counts(&self, page: &Page) -> ParseResult<UpstreamCounts> {
        let counts: FeedCounts = Self::decode(page)?;
        Ok(UpstreamCounts {
            past_24h: counts.past_24h,
            past_week: counts.past_week,
            past_month: counts.past_month,
            any_time: counts.any_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn page(body: &str) -> Page {
        Page::new("https://feed.example/jobs", body, Utc::now())
    }

    #[test]
    fn test_search_url() {
        let parser = JsonFeedParser::new("https://feed.example/jobs", 25);
        let url = parser.search_url(&ScrapeTarget::new("Ottawa", "Data Analyst", 100), 3);

        assert_eq!(
            url,
            "https://feed.example/jobs?keywords=Data+Analyst&location=Ottawa&page=3&per_page=25"
        );
    }

    #[test]
    fn test_parse_search_page() {
        let parser = JsonFeedParser::new("https://feed.example/jobs", 25);
        let body = r#"{
            "jobs": [
                {"id": 17, "title": "Dev", "company": "Acme", "seniority_level": "Entry level",
                 "posted_at": "2024-03-01T10:00:00Z", "url": "https://feed.example/jobs/17"},
                {"job_id": "x-2", "title": "QA"}
            ],
            "has_more": true
        }"#;

        let parsed = parser.parse_search(&page(body)).unwrap();
        assert!(parsed.has_next_page);
        assert_eq!(parsed.candidates.len(), 2);
        assert_eq!(parsed.candidates[0].job_id.as_deref(), Some("17"));
        assert_eq!(parsed.candidates[0].seniority.as_deref(), Some("Entry level"));
        assert_eq!(parsed.candidates[1].job_id.as_deref(), Some("x-2"));
    }

    #[test]
    fn test_missing_has_more_ends_pagination() {
        let parser = JsonFeedParser::new("https://feed.example/jobs", 25);
        let parsed = parser.parse_search(&page(r#"{"jobs": []}"#)).unwrap();

        assert!(parsed.candidates.is_empty());
        assert!(!parsed.has_next_page);
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        let parser = JsonFeedParser::new("https://feed.example/jobs", 25);
        let err = parser.parse_search(&page("<html>maintenance</html>")).unwrap_err();

        assert!(matches!(err, ParseError::Json { .. }));
    }

    #[test]
    fn test_parse_company() {
        let parser = JsonFeedParser::new("https://feed.example/jobs", 25);
        let details = parser
            .parse_company(&page(r#"{"company_size": "51-200", "industry": "Fintech"}"#))
            .unwrap();

        assert_eq!(details.size.as_deref(), Some("51-200"));
        assert_eq!(details.industry.as_deref(), Some("Fintech"));
    }

    #[test]
    fn test_counts() {
        let parser = JsonFeedParser::new("https://feed.example/jobs", 25);
        let target = ScrapeTarget::new("Ottawa", "Data Analyst", 100);

        assert_eq!(
            parser.counts_url(&target).unwrap(),
            "https://feed.example/jobs/counts?keywords=Data+Analyst&location=Ottawa"
        );

        let counts = parser
            .parse_total_counts(&page(r#"{"24h": 2, "week": 9, "total": 150}"#))
            .unwrap();
        assert_eq!(counts.past_24h, Some(2));
        assert_eq!(counts.past_week, Some(9));
        assert_eq!(counts.past_month, None);
        assert_eq!(counts.any_time, Some(150));
    }
}
