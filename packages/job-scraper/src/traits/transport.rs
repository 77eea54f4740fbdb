//! Raw HTTP transport.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::page::RawResponse;

/// Issues one GET request and returns the raw status and body.
///
/// Implementations do not retry, throttle or classify statuses; that is the
/// job of the [`Fetcher`](crate::traits::fetcher::Fetcher).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError>;
}
