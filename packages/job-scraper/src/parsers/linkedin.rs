//! Parser for the public guest job search.
//!
//! Search pages come from the `seeMoreJobPostings` fragment endpoint, which
//! returns a list of `base-search-card` elements and an empty body once the
//! results run out. Listing pages carry a criteria list (seniority, employment
//! type, job function, industries); company pages a `dt`/`dd` fact list.
//! The full search page labels its posting-date filters with match counts,
//! e.g. `<label for="f_TPR-2">Past week (1,204)</label>`.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

use crate::error::{ParseError, ParseResult};
use crate::traits::parser::{CompanyDetails, JobDetails, ListingParser, ParsedPage};
use crate::types::counts::UpstreamCounts;
use crate::types::job::CandidateJob;
use crate::types::page::Page;
use crate::types::target::ScrapeTarget;

pub const DEFAULT_BASE_URL: &str = "https://www.linkedin.com";

/// Cards returned per guest search request.
pub const GUEST_PAGE_SIZE: usize = 10;

const SEARCH_PATH: &str = "/jobs-guest/jobs/api/seeMoreJobPostings/search";
const COUNTS_PATH: &str = "/jobs/search";

// =============================================================================
// Selectors
// =============================================================================

static CARD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.base-search-card").expect("valid selector"));
static CARD_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h3.base-search-card__title").expect("valid selector"));
static CARD_COMPANY: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("h4.base-search-card__subtitle a, a.hidden-nested-link").expect("valid selector")
});
static CARD_COMPANY_TEXT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h4.base-search-card__subtitle").expect("valid selector"));
static CARD_LOCATION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.job-search-card__location").expect("valid selector"));
static CARD_TIME: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("time.job-search-card__listdate, time.job-search-card__listdate--new").expect("valid selector")
});
static CARD_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.base-card__full-link").expect("valid selector"));

static CRITERIA_ITEM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li.description__job-criteria-item").expect("valid selector"));
static CRITERIA_LABEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h3.description__job-criteria-subheader").expect("valid selector"));
static CRITERIA_VALUE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.description__job-criteria-text").expect("valid selector"));
static ORG_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.topcard__org-name-link").expect("valid selector"));

static FACT_TERM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("dt").expect("valid selector"));
static FACT_VALUE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("dd").expect("valid selector"));

static DATE_FILTER_LABEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"label[for^="f_TPR-"]"#).expect("valid selector"));
static COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d[\d,.]*)\)").expect("valid count pattern"));

/// [`ListingParser`] for the `linkedin-guest` source format.
#[derive(Debug, Clone)]
pub struct LinkedInGuestParser {
    base_url: String,
}

impl Default for LinkedInGuestParser {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl LinkedInGuestParser {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn parse_card(card: ElementRef<'_>) -> CandidateJob {
        let company = card.select(&CARD_COMPANY).next();
        let company_name = company
            .map(text_of)
            .or_else(|| card.select(&CARD_COMPANY_TEXT).next().map(text_of));

        let posted = card.select(&CARD_TIME).next().and_then(|time| {
            time.value()
                .attr("datetime")
                .map(str::to_string)
                .or_else(|| Some(text_of(time)))
        });

        let source_url = card
            .select(&CARD_LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(strip_tracking);

        CandidateJob {
            job_id: card.value().attr("data-entity-urn").and_then(job_id_from_urn),
            title: card.select(&CARD_TITLE).next().map(text_of),
            company_name: company_name.filter(|name| !name.is_empty()),
            company_url: company
                .and_then(|a| a.value().attr("href"))
                .map(strip_tracking),
            location: card.select(&CARD_LOCATION).next().map(text_of),
            posted: posted.filter(|p| !p.is_empty()),
            source_url,
            ..Default::default()
        }
    }
}

impl ListingParser for LinkedInGuestParser {
    fn name(&self) -> &str {
        "linkedin-guest"
    }

    fn page_size(&self) -> usize {
        GUEST_PAGE_SIZE
    }

    fn search_url(&self, target: &ScrapeTarget, page_index: usize) -> String {
        let start = (page_index * GUEST_PAGE_SIZE).to_string();
        let base = format!("{}{}", self.base_url, SEARCH_PATH);
        match Url::parse_with_params(
            &base,
            &[
                ("keywords", target.position.as_str()),
                ("location", target.city.as_str()),
                ("start", start.as_str()),
            ],
        ) {
            Ok(url) => url.to_string(),
            // Unparseable base URL; the fetcher reports it as InvalidUrl
            Err(_) => base,
        }
    }

    fn parse_search(&self, page: &Page) -> ParseResult<ParsedPage> {
        if !page.has_content() {
            return Ok(ParsedPage::empty());
        }

        let document = Html::parse_fragment(&page.body);
        let cards: Vec<ElementRef<'_>> = document.select(&CARD).collect();
        if cards.is_empty() {
            return Ok(ParsedPage::empty());
        }

        let candidates: Vec<CandidateJob> = cards.iter().copied().map(Self::parse_card).collect();

        let usable = candidates
            .iter()
            .any(|c| c.title.is_some() || c.source_url.is_some());
        if !usable {
            return Err(ParseError::Layout {
                url: page.url.clone(),
                reason: format!("{} cards without title or link", cards.len()),
            });
        }

        let has_next_page = cards.len() >= GUEST_PAGE_SIZE;
        Ok(ParsedPage::new(candidates, has_next_page))
    }

    fn parse_listing(&self, page: &Page) -> ParseResult<JobDetails> {
        let document = Html::parse_document(&page.body);
        let mut details = JobDetails {
            company_url: document
                .select(&ORG_LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(strip_tracking),
            ..Default::default()
        };

        let items: Vec<ElementRef<'_>> = document.select(&CRITERIA_ITEM).collect();
        let mut unlabeled = Vec::new();
        for item in &items {
            let Some(value) = item.select(&CRITERIA_VALUE).next().map(text_of) else {
                continue;
            };
            let label = item
                .select(&CRITERIA_LABEL)
                .next()
                .map(text_of)
                .unwrap_or_default()
                .to_ascii_lowercase();

            match label.as_str() {
                "seniority level" => details.seniority = Some(value),
                "employment type" => details.employment_type = Some(value),
                "job function" => details.job_function = Some(value),
                "industries" | "industry" => details.industry = Some(value),
                _ => unlabeled.push(value),
            }
        }

        // Older layouts list the criteria without headers, in a fixed order
        if items.is_empty() {
            unlabeled = document.select(&CRITERIA_VALUE).map(text_of).collect();
        }
        let mut positional = unlabeled.into_iter();
        for slot in [
            &mut details.seniority,
            &mut details.employment_type,
            &mut details.job_function,
            &mut details.industry,
        ] {
            if slot.is_none() {
                *slot = positional.next();
            }
        }

        Ok(details)
    }

    fn parse_company(&self, page: &Page) -> ParseResult<CompanyDetails> {
        let document = Html::parse_document(&page.body);
        let terms = document.select(&FACT_TERM).map(text_of);
        let values = document.select(&FACT_VALUE).map(text_of);

        let mut details = CompanyDetails::default();
        for (term, value) in terms.zip(values) {
            match term.to_ascii_lowercase().as_str() {
                "company size" => details.size = Some(value),
                "industry" | "industries" => details.industry = Some(value),
                _ => {}
            }
        }
        Ok(details)
    }

    fn counts_url(&self, target: &ScrapeTarget) -> Option<String> {
        let base = format!("{}{}", self.base_url, COUNTS_PATH);
        Url::parse_with_params(
            &base,
            &[
                ("keywords", target.position.as_str()),
                ("location", target.city.as_str()),
                ("position", "0"),
                ("pageNum", "0"),
            ],
        )
        .ok()
        .map(|url| url.to_string())
    }

    fn parse_total_counts(&self, page: &Page) -> ParseResult<UpstreamCounts> {
        let document = Html::parse_document(&page.body);
        let mut counts = UpstreamCounts::default();
        let mut labels = 0;

        for label in document.select(&DATE_FILTER_LABEL) {
            let slot = match label.value().attr("for") {
                Some("f_TPR-0") => &mut counts.any_time,
                Some("f_TPR-1") => &mut counts.past_month,
                Some("f_TPR-2") => &mut counts.past_week,
                Some("f_TPR-3") => &mut counts.past_24h,
                _ => continue,
            };
            labels += 1;
            // The first label for a window wins
            if slot.is_none() {
                *slot = last_number(&text_of(label));
            }
        }

        if labels == 0 {
            return Err(ParseError::Layout {
                url: page.url.clone(),
                reason: "no posting-date filter labels".to_string(),
            });
        }
        Ok(counts)
    }
}

/// Last parenthesized number in `text`, ignoring thousands separators.
fn last_number(text: &str) -> Option<u64> {
    let raw = COUNT.captures_iter(text).last()?.get(1)?.as_str();
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Whitespace-collapsed text content.
fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `urn:li:jobPosting:3912345678` -> `3912345678`
fn job_id_from_urn(urn: &str) -> Option<String> {
    urn.rsplit(':')
        .next()
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// Drop tracking query parameters from a link.
fn strip_tracking(href: &str) -> String {
    match Url::parse(href.trim()) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => href.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn card(id: u32, title: &str) -> String {
        format!(
            r#"<li><div class="base-card base-search-card job-search-card" data-entity-urn="urn:li:jobPosting:{id}">
                <a class="base-card__full-link" href="https://ca.linkedin.com/jobs/view/dev-{id}?refId=abc&trk=x"></a>
                <div class="base-search-card__info">
                  <h3 class="base-search-card__title"> {title} </h3>
                  <h4 class="base-search-card__subtitle">
                    <a class="hidden-nested-link" href="https://ca.linkedin.com/company/acme?trk=public">Acme Corp</a>
                  </h4>
                  <div class="base-search-card__metadata">
                    <span class="job-search-card__location">Toronto, Ontario, Canada</span>
                    <time class="job-search-card__listdate" datetime="2024-03-01">2 weeks ago</time>
                  </div>
                </div>
              </div></li>"#
        )
    }

    fn page(body: String) -> Page {
        Page::new("https://www.linkedin.com/jobs-guest/test", body, Utc::now())
    }

    #[test]
    fn test_search_url_encodes_query() {
        let parser = LinkedInGuestParser::default();
        let target = ScrapeTarget::new("Toronto", "Software Engineer", 100);

        let url = parser.search_url(&target, 2);
        assert!(url.starts_with("https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search?"));
        assert!(url.contains("keywords=Software+Engineer"));
        assert!(url.contains("location=Toronto"));
        assert!(url.ends_with("start=20"));
    }

    #[test]
    fn test_parse_cards() {
        let parser = LinkedInGuestParser::default();
        let parsed = parser.parse_search(&page(card(42, "Backend Developer"))).unwrap();

        assert_eq!(parsed.candidates.len(), 1);
        assert!(!parsed.has_next_page);

        let job = &parsed.candidates[0];
        assert_eq!(job.job_id.as_deref(), Some("42"));
        assert_eq!(job.title.as_deref(), Some("Backend Developer"));
        assert_eq!(job.company_name.as_deref(), Some("Acme Corp"));
        assert_eq!(job.company_url.as_deref(), Some("https://ca.linkedin.com/company/acme"));
        assert_eq!(job.location.as_deref(), Some("Toronto, Ontario, Canada"));
        assert_eq!(job.posted.as_deref(), Some("2024-03-01"));
        assert_eq!(job.source_url.as_deref(), Some("https://ca.linkedin.com/jobs/view/dev-42"));
    }

    #[test]
    fn test_full_page_has_next() {
        let parser = LinkedInGuestParser::default();
        let body: String = (0..GUEST_PAGE_SIZE as u32).map(|i| card(i, "Dev")).collect();

        let parsed = parser.parse_search(&page(body)).unwrap();
        assert_eq!(parsed.candidates.len(), GUEST_PAGE_SIZE);
        assert!(parsed.has_next_page);
    }

    #[test]
    fn test_empty_body_ends_pagination() {
        let parser = LinkedInGuestParser::default();
        let parsed = parser.parse_search(&page(String::new())).unwrap();

        assert!(parsed.candidates.is_empty());
        assert!(!parsed.has_next_page);
    }

    #[test]
    fn test_cards_without_content_are_a_layout_error() {
        let parser = LinkedInGuestParser::default();
        let body = r#"<div class="base-search-card"><span>changed</span></div>"#.repeat(3);

        let err = parser.parse_search(&page(body)).unwrap_err();
        assert!(matches!(err, ParseError::Layout { .. }));
    }

    #[test]
    fn test_parse_listing_criteria() {
        let parser = LinkedInGuestParser::default();
        let body = r#"<html><body>
            <a class="topcard__org-name-link topcard__flavor--black-link" href="https://ca.linkedin.com/company/acme?trk=x">Acme</a>
            <ul class="description__job-criteria-list">
              <li class="description__job-criteria-item">
                <h3 class="description__job-criteria-subheader">Seniority level</h3>
                <span class="description__job-criteria-text description__job-criteria-text--criteria">Entry level</span>
              </li>
              <li class="description__job-criteria-item">
                <h3 class="description__job-criteria-subheader">Employment type</h3>
                <span class="description__job-criteria-text description__job-criteria-text--criteria">Full-time</span>
              </li>
              <li class="description__job-criteria-item">
                <h3 class="description__job-criteria-subheader">Industries</h3>
                <span class="description__job-criteria-text description__job-criteria-text--criteria">Software Development</span>
              </li>
            </ul></body></html>"#;

        let details = parser.parse_listing(&page(body.to_string())).unwrap();
        assert_eq!(details.seniority.as_deref(), Some("Entry level"));
        assert_eq!(details.employment_type.as_deref(), Some("Full-time"));
        assert_eq!(details.industry.as_deref(), Some("Software Development"));
        assert_eq!(details.job_function, None);
        assert_eq!(details.company_url.as_deref(), Some("https://ca.linkedin.com/company/acme"));
    }

    #[test]
    fn test_parse_company_facts() {
        let parser = LinkedInGuestParser::default();
        let body = r#"<html><body><dl>
            <div class="mb-2 flex"><dt>Website</dt><dd>https://acme.example</dd></div>
            <div class="mb-2 flex"><dt>Industry</dt><dd>Software Development</dd></div>
            <div class="mb-2 flex"><dt>Company size</dt><dd>1,001-5,000 employees</dd></div>
            </dl></body></html>"#;

        let details = parser.parse_company(&page(body.to_string())).unwrap();
        assert_eq!(details.size.as_deref(), Some("1,001-5,000 employees"));
        assert_eq!(details.industry.as_deref(), Some("Software Development"));
    }

    #[test]
    fn test_selectors_compile() {
        for selector in [
            &CARD,
            &CARD_TITLE,
            &CARD_COMPANY,
            &CARD_COMPANY_TEXT,
            &CARD_LOCATION,
            &CARD_TIME,
            &CARD_LINK,
            &CRITERIA_ITEM,
            &CRITERIA_LABEL,
            &CRITERIA_VALUE,
            &ORG_LINK,
            &FACT_TERM,
            &FACT_VALUE,
            &DATE_FILTER_LABEL,
        ] {
            LazyLock::force(selector);
        }
        LazyLock::force(&COUNT);
    }

    #[test]
    fn test_counts_url() {
        let parser = LinkedInGuestParser::default();
        let url = parser
            .counts_url(&ScrapeTarget::new("Toronto", "Software Engineer", 100))
            .unwrap();

        assert_eq!(
            url,
            "https://www.linkedin.com/jobs/search?keywords=Software+Engineer&location=Toronto&position=0&pageNum=0"
        );
    }

    #[test]
    fn test_parse_total_counts() {
        let parser = LinkedInGuestParser::default();
        let body = r#"<html><body><form><fieldset>
            <div><input type="radio" id="f_TPR-0" value=""><label for="f_TPR-0">Any time (2,345)</label></div>
            <div><input type="radio" id="f_TPR-1" value="r2592000"><label for="f_TPR-1">Past month (1,204)</label></div>
            <div><input type="radio" id="f_TPR-2" value="r604800"><label for="f_TPR-2">Past week (318)</label></div>
            <div><input type="radio" id="f_TPR-3" value="r86400"><label for="f_TPR-3">Past 24 hours</label></div>
            <div><input type="radio" id="f_TPR-0-dup"><label for="f_TPR-0">Any time (9)</label></div>
            </fieldset></form></body></html>"#;

        let counts = parser.parse_total_counts(&page(body.to_string())).unwrap();
        assert_eq!(counts.any_time, Some(2345));
        assert_eq!(counts.past_month, Some(1204));
        assert_eq!(counts.past_week, Some(318));
        assert_eq!(counts.past_24h, None);
    }

    #[test]
    fn test_counts_page_without_filters_is_a_layout_error() {
        let parser = LinkedInGuestParser::default();
        let err = parser
            .parse_total_counts(&page("<html><body>Sign in to continue</body></html>".to_string()))
            .unwrap_err();

        assert!(matches!(err, ParseError::Layout { .. }));
    }

    #[test]
    fn test_last_number() {
        assert_eq!(last_number("Past week (1,204)"), Some(1204));
        assert_eq!(last_number("Past 24 hours (7)"), Some(7));
        assert_eq!(last_number("Past 24 hours"), None);
        assert_eq!(last_number("Any time"), None);
    }

    #[test]
    fn test_job_id_from_urn() {
        assert_eq!(job_id_from_urn("urn:li:jobPosting:3912345678").as_deref(), Some("3912345678"));
        assert_eq!(job_id_from_urn("urn:li:jobPosting:"), None);
    }
}
