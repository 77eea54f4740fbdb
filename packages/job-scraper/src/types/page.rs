//! Fetched page content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of a successfully fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub status: u16,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

impl Page {
    pub fn new(url: impl Into<String>, body: impl Into<String>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            body: body.into(),
            fetched_at,
        }
    }

    /// Check if this page has content.
    pub fn has_content(&self) -> bool {
        !self.body.trim().is_empty()
    }
}

/// One raw HTTP response as returned by a transport, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    pub fn ok(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(url, 200, body)
    }
}
