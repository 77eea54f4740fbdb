//! Outbound fetching: per-host rate budget, retry policy and HTTP transport.

pub mod budget;
pub mod fetcher;
pub mod http;

pub use budget::RateBudget;
pub use fetcher::{FetchPolicy, RateLimitedFetcher, RetryDecision};
pub use http::ReqwestTransport;
