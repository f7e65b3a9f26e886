//! Error taxonomy for the ingestion subsystem.
//!
//! None of these errors is fatal to the serving path: provider errors are
//! recovered inside the cycle, normalization errors drop a single item, and
//! cache write errors only affect durability.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of one provider fetch for one subject.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited by provider (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::Timeout(_) => ProviderErrorKind::Timeout,
            ProviderError::RateLimited { .. } => ProviderErrorKind::RateLimited,
            ProviderError::Auth(_) => ProviderErrorKind::Auth,
            ProviderError::MalformedResponse(_) => ProviderErrorKind::MalformedResponse,
            ProviderError::Transport(_) => ProviderErrorKind::Transport,
        }
    }

    /// Whether a bounded retry may help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::RateLimited { .. }
                | ProviderError::Transport(_)
        )
    }

    pub(crate) fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout(timeout)
        } else if e.is_decode() {
            ProviderError::MalformedResponse(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// Serializable classification recorded in snapshot meta and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Timeout,
    RateLimited,
    Auth,
    MalformedResponse,
    Transport,
}

impl ProviderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::RateLimited => "rate_limited",
            ProviderErrorKind::Auth => "auth",
            ProviderErrorKind::MalformedResponse => "malformed_response",
            ProviderErrorKind::Transport => "transport",
        }
    }
}

/// Item-level rejection; the item is dropped and counted.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("item has no subject")]
    MissingSubject,
    #[error("item text is empty after normalization")]
    EmptyText,
    #[error("item timestamp is missing or not a recognized format")]
    BadTimestamp,
}

/// Durable persistence failure. The in-memory snapshot is still published.
#[derive(Debug, Error)]
pub enum CacheWriteError {
    #[error("snapshot io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
