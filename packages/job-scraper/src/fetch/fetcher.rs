//! Rate-limited, retrying fetcher.
//!
//! Wraps a [`Transport`] with the per-host [`RateBudget`] and an explicit
//! retry loop. Every attempt consumes one budget slot, success or not.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult, TransportError};
use crate::fetch::budget::RateBudget;
use crate::traits::clock::Clock;
use crate::traits::fetcher::{FetchContext, Fetcher};
use crate::traits::transport::Transport;
use crate::types::config::ScrapeConfig;
use crate::types::page::{Page, RawResponse};

/// Upper bound for any single backoff.
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Retry and classification policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Minimum spacing between requests to one host; also the transient backoff seed
    pub request_delay: Duration,

    /// Throttle backoff seed, applied to the whole host
    pub rate_limit_delay: Duration,

    /// Substrings that turn a 2xx body into a throttle signal
    pub block_markers: Vec<String>,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from_config(&ScrapeConfig::default())
    }
}

impl FetchPolicy {
    pub fn from_config(config: &ScrapeConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            request_delay: config.request_delay(),
            rate_limit_delay: config.rate_limit_delay(),
            block_markers: config.block_markers.clone(),
        }
    }

    /// Decide what to do after failed attempt number `attempt` (zero-based).
    pub fn decide(&self, error: &FetchError, attempt: u32) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::Fail;
        }
        if attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        if error.is_throttle() {
            RetryDecision::BackoffHost(backoff(self.rate_limit_delay, attempt))
        } else {
            RetryDecision::BackoffLocal(backoff(self.request_delay, attempt))
        }
    }

    /// Map a raw transport result onto success or a classified failure.
    pub fn classify(&self, url: &str, result: Result<RawResponse, TransportError>) -> Result<RawResponse, FetchError> {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                return Err(FetchError::Transient {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        let url = url.to_string();
        match response.status {
            200..=299 => match self.block_marker(&response.body) {
                Some(marker) => Err(FetchError::Throttled {
                    url,
                    reason: format!("block marker {marker:?} in response"),
                }),
                None => Ok(response),
            },
            429 | 999 | 403 => Err(FetchError::Throttled {
                url,
                reason: format!("HTTP {}", response.status),
            }),
            408 | 500..=599 => Err(FetchError::Transient {
                url,
                reason: format!("HTTP {}", response.status),
            }),
            404 | 410 => Err(FetchError::NotFound { url }),
            status => Err(FetchError::Rejected { url, status }),
        }
    }

    fn block_marker(&self, body: &str) -> Option<&str> {
        self.block_markers
            .iter()
            .map(String::as_str)
            .find(|marker| !marker.is_empty() && body.contains(marker))
    }
}

/// Outcome of the retry policy for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Terminal failure; return it unchanged
    Fail,
    /// Retry budget spent
    GiveUp,
    /// Sleep locally, then retry
    BackoffLocal(Duration),
    /// Defer the whole host, then retry
    BackoffHost(Duration),
}

/// `base * 2^attempt`, capped at [`MAX_BACKOFF`].
pub fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt)).min(MAX_BACKOFF)
}

/// Production [`Fetcher`]: transport + shared rate budget + retry policy.
pub struct RateLimitedFetcher {
    transport: Arc<dyn Transport>,
    budget: Arc<RateBudget>,
    clock: Arc<dyn Clock>,
    policy: FetchPolicy,
}

impl RateLimitedFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        budget: Arc<RateBudget>,
        clock: Arc<dyn Clock>,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            transport,
            budget,
            clock,
            policy,
        }
    }

    /// Build from config with a fresh budget on the given clock.
    pub fn from_config(config: &ScrapeConfig, transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        let budget = Arc::new(RateBudget::new(config.request_delay(), clock.clone()));
        Self::new(transport, budget, clock, FetchPolicy::from_config(config))
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn wait(&self, duration: Duration, ctx: &FetchContext) -> bool {
        if duration.is_zero() {
            return true;
        }
        tokio::select! {
            _ = self.clock.sleep(duration) => true,
            _ = ctx.cancel.cancelled() => false,
        }
    }
}

#[async_trait]
impl Fetcher for RateLimitedFetcher {
    async fn fetch(&self, url: &str, ctx: &FetchContext) -> FetchResult<Page> {
        let host = host_of(url)?;
        let cancelled = || FetchError::Cancelled {
            url: url.to_string(),
        };

        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 && ctx.is_cancelled() {
                return Err(cancelled());
            }

            loop {
                let wait = self.budget.acquire(&host).await;
                if wait.is_zero() {
                    break;
                }
                if !self.wait(wait, ctx).await {
                    return Err(cancelled());
                }
            }

            debug!(target_label = %ctx.label, url, attempt, "Fetching");
            let result = self.transport.get(url).await;

            let error = match self.policy.classify(url, result) {
                Ok(response) => {
                    debug!(target_label = %ctx.label, url, status = response.status, attempt, "Fetched");
                    return Ok(Page {
                        url: response.url,
                        status: response.status,
                        body: response.body,
                        fetched_at: self.clock.now(),
                    })
                }
                Err(e) => e,
            };

            match self.policy.decide(&error, attempt) {
                RetryDecision::Fail => return Err(error),
                RetryDecision::GiveUp => {
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt + 1,
                        last: error.to_string(),
                    })
                }
                RetryDecision::BackoffHost(delay) => {
                    warn!(
                        target_label = %ctx.label,
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Throttled, deferring host"
                    );
                    self.budget.defer(&host, delay).await;
                }
                RetryDecision::BackoffLocal(delay) => {
                    warn!(
                        target_label = %ctx.label,
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, backing off"
                    );
                    if !self.wait(delay, ctx).await {
                        return Err(cancelled());
                    }
                }
            }

            attempt += 1;
        }
    }
}

fn host_of(url: &str) -> FetchResult<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .ok_or_else(|| FetchError::InvalidUrl {
            url: url.to_string(),
        })
}
