//! Typed errors for the scraping engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Every per-target error is
//! caught at the target boundary and turned into a [`FailureClass`] in the run
//! report; only [`ConfigError`] aborts a run before work begins.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::target::DatasetKey;

/// Errors from a single raw transport attempt (one HTTP request).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Request timed out
    #[error("request timed out")]
    Timeout,

    /// Could not connect to the upstream host
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other transport failure (TLS, body decoding, ...)
    #[error("transport error: {0}")]
    Other(String),
}

/// Terminal and retryable failures of the rate-limited fetcher.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network error, timeout, HTTP 408 or 5xx
    #[error("transient failure fetching {url}: {reason}")]
    Transient { url: String, reason: String },

    /// HTTP 429 or an upstream block signal
    #[error("throttled by upstream fetching {url}: {reason}")]
    Throttled { url: String, reason: String },

    /// HTTP 404 / 410
    #[error("not found: {url}")]
    NotFound { url: String },

    /// Non-retryable client error (e.g. 401 on an auth wall)
    #[error("rejected with HTTP {status}: {url}")]
    Rejected { url: String, status: u16 },

    /// Retry budget spent
    #[error("gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    /// Cancellation observed between attempts
    #[error("fetch cancelled: {url}")]
    Cancelled { url: String },

    /// URL could not be parsed into a host
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },
}

impl FetchError {
    /// Whether the fetcher may retry this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Throttled { .. })
    }

    /// Whether this failure signals upstream throttling.
    pub fn is_throttle(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    /// Classification used in the run report.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Transient { .. } => FailureClass::Transient,
            Self::Throttled { .. } => FailureClass::Throttle,
            Self::NotFound { .. } => FailureClass::NotFound,
            Self::Rejected { .. } | Self::InvalidUrl { .. } => FailureClass::Rejected,
            Self::Exhausted { .. } => FailureClass::Exhausted,
            Self::Cancelled { .. } => FailureClass::Cancelled,
        }
    }
}

/// Errors raised by a [`ListingParser`](crate::traits::parser::ListingParser).
#[derive(Debug, Error)]
pub enum ParseError {
    /// The page does not have the expected structure
    #[error("unexpected page layout at {url}: {reason}")]
    Layout { url: String, reason: String },

    /// JSON body could not be decoded
    #[error("JSON parse error at {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Storage and merge failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding failure (run reports)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored CSV file has a different column set than the rows it should hold
    #[error("header mismatch in {path}: expected {expected:?}, found {found:?}")]
    HeaderMismatch {
        path: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// Atomic replace of the destination failed
    #[error("could not replace {path}: {reason}")]
    Persist { path: String, reason: String },

    /// Blocking storage task panicked or was aborted
    #[error("storage task failed: {0}")]
    Task(String),

    /// Injected or backend-specific failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Invalid run configuration. Fails the run before any fetch is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no cities configured")]
    NoCities,

    #[error("no positions configured")]
    NoPositions,

    #[error("invalid {field} name {value:?}: {reason}")]
    InvalidName {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("source format {format} requires a base_url")]
    MissingBaseUrl { format: &'static str },

    #[error("invalid value for {field}: {value} ({reason})")]
    InvalidLimit {
        field: &'static str,
        value: u64,
        reason: &'static str,
    },
}

/// Top-level errors of the engine and the dashboard read contract.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Configuration was rejected
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// HTTP client could not be set up
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),

    /// Requested dataset does not exist
    #[error("dataset not found: {key}")]
    DatasetNotFound { key: DatasetKey },
}

/// Terminal error classification reported per target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Transient,
    Throttle,
    NotFound,
    Rejected,
    Exhausted,
    Parse,
    Merge,
    Cancelled,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Transient => "transient",
            Self::Throttle => "throttle",
            Self::NotFound => "not_found",
            Self::Rejected => "rejected",
            Self::Exhausted => "exhausted",
            Self::Parse => "parse",
            Self::Merge => "merge",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for parse operations.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Result type alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
