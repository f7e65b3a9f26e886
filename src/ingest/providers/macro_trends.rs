// src/ingest/providers/macro_trends.rs
//! Macro statistics as items for topic subjects (`INFLATION`, `GROWTH`,
//! `COMMODITIES`, `GEOPOLITICS`). Latest FRED observations become short
//! bullets; without an API key, or for topics no series backs, the curated
//! fallback buckets are served instead. Other subjects get nothing.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;

use crate::error::ProviderError;
use crate::ingest::providers::{http_client, read_body};
use crate::ingest::types::{FetchRequest, RawItem, SourceProvider};

pub const ENV_FRED_KEY: &str = "FRED_API_KEY";

const DEFAULT_URL: &str = "https://api.stlouisfed.org/fred/series/observations";
const PROVIDER: &str = "macro";
const DESK: &str = "macro-desk";

pub const TOPICS: [&str; 4] = ["INFLATION", "GROWTH", "COMMODITIES", "GEOPOLITICS"];

const FALLBACK_BUCKETS: [(&str, [&str; 2]); 4] = [
    (
        "INFLATION",
        [
            "Headline CPI cooled to 2.9% YoY while services inflation remains sticky.",
            "Fed funds futures imply two 25bp cuts by year-end; policymakers stay data-dependent.",
        ],
    ),
    (
        "GROWTH",
        [
            "US ISM Manufacturing ticked back above 50 signalling tentative expansion.",
            "Global PMIs mixed: eurozone stabilising while China demand remains soft.",
        ],
    ),
    (
        "COMMODITIES",
        [
            "Brent crude holds near $85 as OPEC+ keeps voluntary cuts in place.",
            "Gold trades above $2,100 on safe-haven flows and a softer dollar tone.",
        ],
    ),
    (
        "GEOPOLITICS",
        [
            "Middle East tensions sustain elevated shipping costs; Red Sea detours persist.",
            "US election rhetoric ramps up, adding policy uncertainty to fiscal outlook.",
        ],
    ),
];

/// FRED series backing each topic, in bullet order.
fn series_for(topic: &str) -> &'static [&'static str] {
    match topic {
        "INFLATION" => &["CPIAUCSL", "CPILFESL", "FEDFUNDS"],
        "GROWTH" => &["NAPM", "GDPC1"],
        "COMMODITIES" => &["DCOILWTICO", "DCOILBRENTEU"],
        _ => &[],
    }
}

#[derive(Debug, Deserialize)]
struct ObservationPage {
    #[serde(default)]
    observations: Vec<Observation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Observation {
    pub date: String,
    pub value: String,
}

impl Observation {
    /// FRED marks missing values with ".".
    fn number(&self) -> Option<f64> {
        self.value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

/// Newest observation with a usable value, or `None` when the series is empty.
pub fn parse_observations(body: &str) -> Result<Option<Observation>, ProviderError> {
    let page: ObservationPage = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("fred json: {e}")))?;
    Ok(page.observations.into_iter().find(|o| o.number().is_some()))
}

fn bullet(series: &str, obs: &Observation) -> Option<(String, Option<&'static str>)> {
    let v = obs.number()?;
    let d = &obs.date;
    let out = match series {
        "CPIAUCSL" => (format!("Headline CPI index ({d}) printed at {v:.1}."), None),
        "CPILFESL" => (format!("Core CPI index ({d}) at {v:.1} keeps services inflation in focus."), None),
        "FEDFUNDS" => (format!("Effective fed funds rate stands near {v:.2}% ({d})."), None),
        "NAPM" if v >= 50.0 => (
            format!("ISM manufacturing index ({d}) printed at {v:.1}, suggesting expansion."),
            Some("bullish"),
        ),
        "NAPM" => (
            format!("ISM manufacturing index ({d}) printed at {v:.1}, signalling contraction."),
            Some("bearish"),
        ),
        "GDPC1" => (format!("Real GDP ({d}) now tracking at {v:.2} (SAAR)."), None),
        "DCOILWTICO" => (format!("WTI crude trades around ${v:.2} per barrel (latest {d})."), None),
        "DCOILBRENTEU" => (format!("Brent crude settles near ${v:.2} per barrel (latest {d})."), None),
        _ => return None,
    };
    Some(out)
}

/// Turn the observations a topic has into items; an empty result falls back
/// to the curated bucket stamped with `now`.
pub fn topic_items(
    topic: &str,
    observations: &HashMap<String, Observation>,
    max_items: usize,
    now: &str,
) -> Vec<RawItem> {
    let item = |source_id: String, author: &str, text: String, ts: String, label: Option<&str>| RawItem {
        subject: topic.to_string(),
        source_id: Some(source_id),
        author: Some(author.to_string()),
        text: Some(text),
        timestamp: Some(ts),
        likes: Some(0),
        reposts: Some(0),
        provider: PROVIDER.to_string(),
        label: label.map(str::to_string),
        url: None,
    };

    let mut out: Vec<RawItem> = series_for(topic)
        .iter()
        .filter_map(|s| {
            let obs = observations.get(*s)?;
            let (text, label) = bullet(s, obs)?;
            Some(item(format!("{s}:{}", obs.date), "FRED", text, obs.date.clone(), label))
        })
        .collect();

    if out.is_empty() {
        if let Some((_, lines)) = FALLBACK_BUCKETS.iter().find(|(t, _)| *t == topic) {
            out = lines
                .iter()
                .enumerate()
                .map(|(i, l)| {
                    let id = format!("fallback:{}:{i}", topic.to_ascii_lowercase());
                    item(id, DESK, l.to_string(), now.to_string(), None)
                })
                .collect();
        }
    }
    out.truncate(max_items);
    out
}

/// Observations are periodic releases, so the lookback window is not applied.
pub struct MacroProvider {
    mode: Mode,
}

enum Mode {
    /// Series id to recorded FRED response.
    Fixture(HashMap<String, serde_json::Value>),
    Http {
        url: String,
        api_key: Option<String>,
        client: reqwest::Client,
        timeout: Duration,
    },
}

impl MacroProvider {
    pub fn from_env(timeout: Duration) -> Self {
        let key = std::env::var(ENV_FRED_KEY)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        Self::with_key(DEFAULT_URL, key, timeout)
    }

    pub fn with_key(url: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            mode: Mode::Http {
                url: url.to_string(),
                api_key,
                client: http_client(timeout),
                timeout,
            },
        }
    }

    /// `body` maps series ids to recorded FRED responses.
    pub fn from_fixture(body: &str) -> Result<Self, ProviderError> {
        let series: HashMap<String, serde_json::Value> = serde_json::from_str(body)
            .map_err(|e| ProviderError::MalformedResponse(format!("macro fixture json: {e}")))?;
        Ok(Self {
            mode: Mode::Fixture(series),
        })
    }

    async fn observations(&self, topic: &str) -> Result<HashMap<String, Observation>, ProviderError> {
        let mut out = HashMap::new();
        match &self.mode {
            Mode::Fixture(recorded) => {
                for s in series_for(topic) {
                    let Some(body) = recorded.get(*s) else {
                        continue;
                    };
                    if let Some(obs) = parse_observations(&body.to_string())? {
                        out.insert(s.to_string(), obs);
                    }
                }
            }
            Mode::Http { api_key: None, .. } => {}
            Mode::Http {
                url,
                api_key: Some(key),
                client,
                timeout,
            } => {
                for s in series_for(topic) {
                    let resp = client
                        .get(url)
                        .query(&[
                            ("series_id", *s),
                            ("api_key", key.as_str()),
                            ("file_type", "json"),
                            ("sort_order", "desc"),
                            ("limit", "5"),
                        ])
                        .send()
                        .await
                        .map_err(|e| ProviderError::from_reqwest(e, *timeout))?;
                    let body = read_body(resp, *timeout).await?;
                    if let Some(obs) = parse_observations(&body)? {
                        out.insert(s.to_string(), obs);
                    }
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for MacroProvider {
    async fn fetch(&self, subject: &str, req: &FetchRequest) -> Result<Vec<RawItem>, ProviderError> {
        let topic = subject.trim().to_ascii_uppercase();
        if !TOPICS.contains(&topic.as_str()) {
            return Ok(Vec::new());
        }
        let observations = self.observations(&topic).await?;
        if observations.is_empty() {
            tracing::debug!(target: "ingest", topic = %topic, "no macro observations; serving fallback bucket");
        }
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        Ok(topic_items(&topic, &observations, req.max_items, &now))
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}
