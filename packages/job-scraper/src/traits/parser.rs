//! Site-specific page parsing.
//!
//! A [`ListingParser`] knows one upstream's URL scheme and page layout. It
//! turns search-result pages into [`CandidateJob`]s and, optionally, listing
//! and company pages into enrichment details. Parsing never suspends.

use serde::{Deserialize, Serialize};

use crate::error::ParseResult;
use crate::types::counts::UpstreamCounts;
use crate::types::job::{CandidateJob, CompanySize, EmploymentType, JobRecord, SeniorityLevel};
use crate::types::page::Page;
use crate::types::target::ScrapeTarget;

/// Result of parsing one search-results page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    /// Candidates in source page order
    pub candidates: Vec<CandidateJob>,

    /// Whether the upstream has more results after this page
    pub has_next_page: bool,
}

impl ParsedPage {
    pub fn new(candidates: Vec<CandidateJob>, has_next_page: bool) -> Self {
        Self {
            candidates,
            has_next_page,
        }
    }

    /// Terminal page with no results.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Attributes found on a listing's own page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDetails {
    pub seniority: Option<String>,
    pub employment_type: Option<String>,
    pub job_function: Option<String>,
    pub industry: Option<String>,
    pub company_url: Option<String>,
}

impl JobDetails {
    /// Fill fields the search card left unknown.
    pub fn apply_to(&self, record: &mut JobRecord) {
        if record.seniority_level == SeniorityLevel::Unknown {
            if let Some(label) = &self.seniority {
                record.seniority_level = SeniorityLevel::from_label(label);
            }
        }
        if record.employment_type == EmploymentType::Unknown {
            if let Some(label) = &self.employment_type {
                record.employment_type = EmploymentType::from_label(label);
            }
        }
        fill_industry(record, self.industry.as_deref());
    }
}

/// Attributes found on a company page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyDetails {
    pub size: Option<String>,
    pub industry: Option<String>,
}

impl CompanyDetails {
    pub fn apply_to(&self, record: &mut JobRecord) {
        if record.company_size_category == CompanySize::Unknown {
            if let Some(label) = &self.size {
                record.company_size_category = CompanySize::from_label(label);
            }
        }
        fill_industry(record, self.industry.as_deref());
    }
}

fn fill_industry(record: &mut JobRecord, industry: Option<&str>) {
    if !record.company_industry.trim().is_empty() {
        return;
    }
    if let Some(industry) = industry.map(str::trim).filter(|i| !i.is_empty()) {
        record.company_industry = industry.to_string();
    }
}

/// Pluggable parser for one upstream source.
pub trait ListingParser: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Results the upstream returns per search page.
    fn page_size(&self) -> usize;

    /// URL of the zero-based `page_index`-th search page for a target.
    fn search_url(&self, target: &ScrapeTarget, page_index: usize) -> String;

    /// Parse a search-results page.
    ///
    /// An empty page with `has_next_page = false` is normal termination, not
    /// an error.
    fn parse_search(&self, page: &Page) -> ParseResult<ParsedPage>;

    /// Parse a listing page for enrichment.
    fn parse_listing(&self, _page: &Page) -> ParseResult<JobDetails> {
        Ok(JobDetails::default())
    }

    /// Parse a company page for enrichment.
    fn parse_company(&self, _page: &Page) -> ParseResult<CompanyDetails> {
        Ok(CompanyDetails::default())
    }

    /// URL of the page stating how many postings match a target, for
    /// sources that publish such counts.
    fn counts_url(&self, _target: &ScrapeTarget) -> Option<String> {
        None
    }

    /// Parse the result counts from the page at [`counts_url`](Self::counts_url).
    fn parse_total_counts(&self, _page: &Page) -> ParseResult<UpstreamCounts> {
        Ok(UpstreamCounts::default())
    }
}
