//! Fetcher trait: one logical page fetch with retry and rate limiting.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::FetchResult;
use crate::types::page::Page;

/// Per-call context passed down from the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    /// Log label, usually the target ("Software Engineer in Toronto")
    pub label: String,

    /// Checked before every retry
    pub cancel: CancellationToken,
}

impl FetchContext {
    pub fn new(label: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            label: label.into(),
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Fetches a page, returning its body or a classified failure.
///
/// Terminal failures (`NotFound`, `Rejected`, `Exhausted`) must not be
/// retried by callers.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, ctx: &FetchContext) -> FetchResult<Page>;
}
