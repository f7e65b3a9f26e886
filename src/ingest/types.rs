// src/ingest/types.rs
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::sentiment::Tone;

/// Provider output before normalization. Every field except `provider` may be
/// missing or malformed; the normalizer decides what survives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub subject: String,
    pub source_id: Option<String>, // provider-native id, e.g. tweet id
    pub author: Option<String>,
    pub text: Option<String>,
    pub timestamp: Option<String>, // provider-native: RFC 3339, RFC 2822, ISO date, epoch...
    pub likes: Option<i64>,
    pub reposts: Option<i64>,
    pub provider: String,
    pub label: Option<String>, // externally supplied tone, if the provider has one
    pub url: Option<String>,
}

/// Canonical record after normalization and scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub subject: String,
    pub provider: String,
    pub source_id: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub url: Option<String>,
    pub likes: u64,
    pub reposts: u64,
    pub engagement_score: f64,
    pub label: Option<String>,
    pub tone: Tone,
    pub weight: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Parameters the caller hands to every provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub lookback: Duration,
    pub max_items: usize,
}

/// One external source. Implementations isolate their own wire format and
/// return an explicit classification instead of raising past this boundary.
#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch(&self, subject: &str, req: &FetchRequest) -> Result<Vec<RawItem>, ProviderError>;
    fn name(&self) -> &'static str;
}
