//! Error kinds shared by the acquisition engine, the record store and the HTTP layer.
//!
//! Adapter failures are plain values (`AdapterError`) recorded inside run results;
//! they never travel through `Error`, because one marketplace going down must not
//! fail the whole acquisition run.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Unmapped taxonomy pair or an otherwise unusable static setup. Fatal, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed request parameters, rejected before any acquisition work starts.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

/// Persistence failures. The underlying cause is kept for diagnostics.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store rejected request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("store payload could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Fire-and-return submissions that could not be accepted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("acquisition queue is full")]
    Full,
    #[error("acquisition queue is closed")]
    Closed,
}

/// Why a single adapter invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorKind {
    Timeout,
    Fetch,
    Parse,
    Blocked,
    Unavailable,
}

impl AdapterErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Fetch => "fetch",
            Self::Parse => "parse",
            Self::Blocked => "blocked",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one source adapter for one query.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("{adapter} adapter failed ({kind}): {message}")]
pub struct AdapterError {
    #[serde(rename = "source")]
    pub adapter: String,
    pub kind: AdapterErrorKind,
    pub message: String,
}

impl AdapterError {
    pub fn new(adapter: impl Into<String>, kind: AdapterErrorKind, message: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(adapter: impl Into<String>, after: Duration) -> Self {
        Self::new(
            adapter,
            AdapterErrorKind::Timeout,
            format!("no result within {}s", after.as_secs_f64()),
        )
    }

    pub fn fetch(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(adapter, AdapterErrorKind::Fetch, message)
    }

    pub fn parse(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(adapter, AdapterErrorKind::Parse, message)
    }

    pub fn blocked(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(adapter, AdapterErrorKind::Blocked, message)
    }

    pub fn unavailable(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(adapter, AdapterErrorKind::Unavailable, message)
    }

    /// Timeouts and transport failures may succeed on another attempt;
    /// blocked responses, parse failures and missing adapters will not.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, AdapterErrorKind::Timeout | AdapterErrorKind::Fetch)
    }
}
