use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ProviderError;
use crate::ingest::providers::{http_client, lenient_int, read_body};
use crate::ingest::types::{FetchRequest, RawItem, SourceProvider};

const DEFAULT_BASE: &str = "https://api.stocktwits.com/api/2/streams/symbol";
const MAX_PAGE: usize = 30;

#[derive(Debug, Deserialize)]
struct Stream {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    id: Option<serde_json::Value>,
    body: Option<String>,
    created_at: Option<String>,
    user: Option<User>,
    entities: Option<Entities>,
    likes: Option<Likes>,
    reshares: Option<Reshares>,
}

#[derive(Debug, Deserialize)]
struct User {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Entities {
    sentiment: Option<Sentiment>,
}

#[derive(Debug, Deserialize)]
struct Sentiment {
    basic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Likes {
    total: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Reshares {
    reshared_count: Option<serde_json::Value>,
}

/// Public symbol stream. Users tag messages Bullish/Bearish themselves; that
/// tag is passed through as the external tone label.
pub struct StockTwitsProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        base_url: String,
        client: reqwest::Client,
        timeout: Duration,
    },
}

impl StockTwitsProvider {
    pub fn live(timeout: Duration) -> Self {
        Self::with_base_url(DEFAULT_BASE, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Self {
        Self {
            mode: Mode::Http {
                base_url: base_url.trim_end_matches('/').to_string(),
                client: http_client(timeout),
                timeout,
            },
        }
    }

    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
        }
    }

    /// Parse a stream body. With `cutoff`, messages whose `created_at` parses
    /// and is older than the cutoff are skipped; unparseable timestamps are
    /// left to the normalizer.
    pub fn parse_stream(
        subject: &str,
        body: &str,
        max_items: usize,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawItem>, ProviderError> {
        let stream: Stream = serde_json::from_str(body)
            .map_err(|e| ProviderError::MalformedResponse(format!("stocktwits json: {e}")))?;

        let out = stream
            .messages
            .into_iter()
            .filter(|m| {
                let (Some(cut), Some(ts)) = (cutoff, m.created_at.as_deref()) else {
                    return true;
                };
                DateTime::parse_from_rfc3339(ts.trim()).map_or(true, |t| t.with_timezone(&Utc) >= cut)
            })
            .take(max_items)
            .map(|m| {
                let author = m.user.and_then(|u| u.username);
                let id = m.id.as_ref().and_then(|v| match v {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                });
                let url = match (&author, &id) {
                    (Some(a), Some(i)) => Some(format!("https://stocktwits.com/{a}/message/{i}")),
                    _ => None,
                };
                RawItem {
                    subject: subject.to_string(),
                    source_id: id,
                    author,
                    text: m.body,
                    timestamp: m.created_at,
                    likes: m.likes.and_then(|l| l.total).as_ref().and_then(lenient_int),
                    reposts: m
                        .reshares
                        .and_then(|r| r.reshared_count)
                        .as_ref()
                        .and_then(lenient_int),
                    provider: "stocktwits".to_string(),
                    label: m.entities.and_then(|e| e.sentiment).and_then(|s| s.basic),
                    url,
                }
            })
            .collect();
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for StockTwitsProvider {
    async fn fetch(&self, subject: &str, req: &FetchRequest) -> Result<Vec<RawItem>, ProviderError> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_stream(subject, body, req.max_items, None),
            Mode::Http {
                base_url,
                client,
                timeout,
            } => {
                let url = format!("{base_url}/{subject}.json");
                let limit = req.max_items.clamp(1, MAX_PAGE).to_string();
                let resp = client
                    .get(&url)
                    .query(&[("limit", limit.as_str())])
                    .header(reqwest::header::ACCEPT, "application/json")
                    .send()
                    .await
                    .map_err(|e| ProviderError::from_reqwest(e, *timeout))?;
                let body = read_body(resp, *timeout).await?;
                let cutoff = chrono::Duration::from_std(req.lookback)
                    .ok()
                    .filter(|d| !d.is_zero())
                    .and_then(|d| Utc::now().checked_sub_signed(d));
                Self::parse_stream(subject, &body, req.max_items, cutoff)
            }
        }
    }

    fn name(&self) -> &'static str {
        "stocktwits"
    }
}
