use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ProviderError;
use crate::ingest::providers::{http_client, lenient_int, read_body};
use crate::ingest::types::{FetchRequest, RawItem, SourceProvider};

pub const ENV_BEARER: &str = "X_BEARER_TOKEN";
pub const ENV_BEARER_LEGACY: &str = "TWITTER_BEARER_TOKEN";

const DEFAULT_URL: &str = "https://api.twitter.com/2/tweets/search/recent";
const MAX_PAGES: usize = 5;

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    data: Vec<Tweet>,
    #[serde(default)]
    includes: Includes,
    #[serde(default)]
    meta: PageMeta,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: Option<String>,
    text: Option<String>,
    author_id: Option<String>,
    created_at: Option<String>,
    #[serde(default)]
    public_metrics: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<XUser>,
}

#[derive(Debug, Deserialize)]
struct XUser {
    id: String,
    username: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PageMeta {
    next_token: Option<String>,
}

/// Recent-search endpoint with public metrics. Needs a bearer token; without
/// one every call fails fast with `Auth`.
pub struct XSearchProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        url: String,
        token: Option<String>,
        client: reqwest::Client,
        timeout: Duration,
    },
}

impl XSearchProvider {
    pub fn from_env(timeout: Duration) -> Self {
        let token = std::env::var(ENV_BEARER)
            .or_else(|_| std::env::var(ENV_BEARER_LEGACY))
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Self::with_token(DEFAULT_URL, token, timeout)
    }

    pub fn with_token(url: &str, token: Option<String>, timeout: Duration) -> Self {
        Self {
            mode: Mode::Http {
                url: url.to_string(),
                token,
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

    /// Parse one page. Returns the items and the continuation token.
    pub fn parse_page(
        subject: &str,
        body: &str,
    ) -> Result<(Vec<RawItem>, Option<String>), ProviderError> {
        let page: SearchPage = serde_json::from_str(body)
            .map_err(|e| ProviderError::MalformedResponse(format!("x search json: {e}")))?;

        let users: HashMap<&str, &str> = page
            .includes
            .users
            .iter()
            .filter_map(|u| u.username.as_deref().map(|n| (u.id.as_str(), n)))
            .collect();

        let items = page
            .data
            .iter()
            .map(|t| {
                let author = t
                    .author_id
                    .as_deref()
                    .and_then(|a| users.get(a))
                    .map(|s| s.to_string());
                let url = t.id.as_ref().map(|id| match &author {
                    Some(a) => format!("https://x.com/{a}/status/{id}"),
                    None => format!("https://x.com/i/web/status/{id}"),
                });
                let metric = |k: &str| t.public_metrics.get(k).and_then(lenient_int);
                RawItem {
                    subject: subject.to_string(),
                    source_id: t.id.clone(),
                    author,
                    text: t.text.clone(),
                    timestamp: t.created_at.clone(),
                    likes: metric("like_count"),
                    reposts: metric("retweet_count"),
                    provider: "x".to_string(),
                    label: None,
                    url,
                }
            })
            .collect();

        Ok((items, page.meta.next_token))
    }
}

#[async_trait]
impl SourceProvider for XSearchProvider {
    async fn fetch(&self, subject: &str, req: &FetchRequest) -> Result<Vec<RawItem>, ProviderError> {
        let (url, token, client, timeout) = match &self.mode {
            Mode::Fixture(body) => {
                let (mut items, _) = Self::parse_page(subject, body)?;
                items.truncate(req.max_items);
                return Ok(items);
            }
            Mode::Http {
                url,
                token,
                client,
                timeout,
            } => (url, token, client, *timeout),
        };
        let token = token
            .as_deref()
            .ok_or_else(|| ProviderError::Auth(format!("{ENV_BEARER} is not set")))?;

        let query = format!("${subject} lang:en -is:retweet");
        let lookback = chrono::Duration::from_std(req.lookback).unwrap_or(chrono::Duration::hours(12));
        // The API rejects start_time values closer than 10s to now.
        let now = chrono::Utc::now();
        let start = now
            .checked_sub_signed(lookback)
            .and_then(|t| t.checked_add_signed(chrono::Duration::seconds(10)))
            .unwrap_or(now)
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();

        let mut out: Vec<RawItem> = Vec::new();
        let mut next: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let remaining = req.max_items.saturating_sub(out.len());
            if remaining == 0 {
                break;
            }
            let max_results = remaining.clamp(10, 100).to_string();
            let mut params: Vec<(&str, &str)> = vec![
                ("query", query.as_str()),
                ("tweet.fields", "created_at,lang,public_metrics"),
                ("expansions", "author_id"),
                ("user.fields", "username"),
                ("max_results", max_results.as_str()),
            ];
            if req.lookback > Duration::ZERO {
                params.push(("start_time", start.as_str()));
            }
            if let Some(tok) = next.as_deref() {
                params.push(("next_token", tok));
            }

            let sent = client
                .get(url)
                .bearer_auth(token)
                .query(&params)
                .send()
                .await
                .map_err(|e| ProviderError::from_reqwest(e, timeout));
            let body = match sent {
                Ok(resp) => read_body(resp, timeout).await,
                Err(e) => Err(e),
            };
            let body = match body {
                Ok(b) => b,
                // Keep what earlier pages returned rather than losing the cycle.
                Err(e @ ProviderError::RateLimited { .. }) if !out.is_empty() => {
                    tracing::warn!(target: "ingest", provider = "x", error = %e, kept = out.len(), "rate limited mid-pagination");
                    break;
                }
                Err(e) => return Err(e),
            };

            let (items, token_next) = Self::parse_page(subject, &body)?;
            if items.is_empty() {
                break;
            }
            out.extend(items);
            match token_next {
                Some(t) => next = Some(t),
                None => break,
            }
        }

        out.truncate(req.max_items);
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "x"
    }
}
