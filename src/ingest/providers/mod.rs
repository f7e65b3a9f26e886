// src/ingest/providers/mod.rs
//! Provider adapters. Each variant owns its wire format; everything past
//! `fetch_guarded` only sees `RawItem`s or a classified `ProviderError`.

pub mod macro_trends;
pub mod news_rss;
pub mod sample;
pub mod stocktwits;
pub mod x_search;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header::RETRY_AFTER, StatusCode};

use crate::error::ProviderError;
use crate::ingest::config::IngestConfig;
use crate::ingest::retry::{retry_with_backoff, RetryPolicy};
use crate::ingest::types::{FetchRequest, RawItem, SourceProvider};

pub use macro_trends::MacroProvider;
pub use news_rss::NewsRssProvider;
pub use sample::SampleProvider;
pub use stocktwits::StockTwitsProvider;
pub use x_search::XSearchProvider;

pub(crate) const USER_AGENT: &str = "sentiment-pulse/0.1 (+https://github.com/lumlich/sentiment-pulse)";

/// Enabled providers in configured order (this order decides first-seen-wins).
pub fn build_providers(cfg: &IngestConfig) -> Vec<Arc<dyn SourceProvider>> {
    let timeout = cfg.provider_timeout();
    let mut out: Vec<Arc<dyn SourceProvider>> = Vec::new();
    if cfg.providers.stocktwits {
        out.push(Arc::new(StockTwitsProvider::live(timeout)));
    }
    if cfg.providers.x {
        out.push(Arc::new(XSearchProvider::from_env(timeout)));
    }
    if cfg.providers.news_rss {
        out.push(Arc::new(NewsRssProvider::live(timeout)));
    }
    if cfg.providers.macro_trends {
        out.push(Arc::new(MacroProvider::from_env(timeout)));
    }
    if cfg.providers.sample {
        out.push(Arc::new(SampleProvider::bundled()));
    }
    out
}

/// One provider call with a per-attempt timeout and bounded retries.
pub async fn fetch_guarded(
    provider: &dyn SourceProvider,
    subject: &str,
    req: &FetchRequest,
    timeout: Duration,
    retry: &RetryPolicy,
) -> Result<Vec<RawItem>, ProviderError> {
    retry_with_backoff(retry, provider.name(), move || async move {
        match tokio::time::timeout(timeout, provider.fetch(subject, req)).await {
            Ok(res) => res,
            Err(_) => Err(ProviderError::Timeout(timeout)),
        }
    })
    .await
}

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "http client builder failed; using defaults");
            reqwest::Client::new()
        })
}

/// Map a response to its body or a classified error.
pub(crate) async fn read_body(
    resp: reqwest::Response,
    timeout: Duration,
) -> Result<String, ProviderError> {
    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(ProviderError::RateLimited { retry_after });
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ProviderError::Auth(format!("HTTP {status}")));
    }
    if status.is_server_error() {
        return Err(ProviderError::Transport(format!("HTTP {status}")));
    }
    if !status.is_success() {
        return Err(ProviderError::MalformedResponse(format!("unexpected HTTP {status}")));
    }
    resp.text()
        .await
        .map_err(|e| ProviderError::from_reqwest(e, timeout))
}

/// JSON numbers arrive as ints, floats or strings depending on the API.
pub(crate) fn lenient_int(v: &serde_json::Value) -> Option<i64> {
    match v {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
