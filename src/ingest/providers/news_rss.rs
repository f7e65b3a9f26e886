use std::time::Duration;

use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::error::ProviderError;
use crate::ingest::providers::{http_client, read_body};
use crate::ingest::types::{FetchRequest, RawItem, SourceProvider};

const DEFAULT_FEED: &str = "https://feeds.finance.yahoo.com/rss/2.0/headline?region=US&lang=en-US&s=";

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// Per-symbol headline feed. Headlines carry no engagement counters, so
/// every item scores at unit magnitude.
pub struct NewsRssProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        feed_prefix: String,
        client: reqwest::Client,
        timeout: Duration,
    },
}

impl NewsRssProvider {
    pub fn live(timeout: Duration) -> Self {
        Self::with_feed_prefix(DEFAULT_FEED, timeout)
    }

    /// The subject is appended to `feed_prefix` to form the feed URL.
    pub fn with_feed_prefix(feed_prefix: &str, timeout: Duration) -> Self {
        Self {
            mode: Mode::Http {
                feed_prefix: feed_prefix.to_string(),
                client: http_client(timeout),
                timeout,
            },
        }
    }

    pub fn from_fixture(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    /// Parse a feed body. With `cutoff`, entries whose date parses and is
    /// older than the cutoff are skipped; undated entries are left to the
    /// normalizer to reject.
    pub fn parse_feed(
        subject: &str,
        xml: &str,
        max_items: usize,
        cutoff: Option<OffsetDateTime>,
    ) -> Result<Vec<RawItem>, ProviderError> {
        let cleaned = scrub_entities_for_xml(xml);
        let rss: Rss = from_str(&cleaned)
            .map_err(|e| ProviderError::MalformedResponse(format!("rss xml: {e}")))?;
        let outlet = rss
            .channel
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("news")
            .to_string();

        let mut out = Vec::with_capacity(rss.channel.item.len().min(max_items));
        for it in rss.channel.item {
            if out.len() >= max_items {
                break;
            }
            if let (Some(cut), Some(ts)) = (cutoff, it.pub_date.as_deref()) {
                if let Ok(dt) = OffsetDateTime::parse(ts.trim(), &Rfc2822) {
                    if dt < cut {
                        continue;
                    }
                }
            }
            let text = match (it.title.as_deref(), it.description.as_deref()) {
                (Some(t), Some(d)) if !d.trim().is_empty() => format!("{}. {}", t.trim(), d.trim()),
                (Some(t), _) => t.to_string(),
                (None, Some(d)) => d.to_string(),
                (None, None) => String::new(),
            };
            out.push(RawItem {
                subject: subject.to_string(),
                source_id: it.link.clone(),
                author: Some(outlet.clone()),
                text: Some(text),
                timestamp: it.pub_date,
                likes: None,
                reposts: None,
                provider: "news_rss".to_string(),
                label: None,
                url: it.link,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for NewsRssProvider {
    async fn fetch(&self, subject: &str, req: &FetchRequest) -> Result<Vec<RawItem>, ProviderError> {
        match &self.mode {
            Mode::Fixture(xml) => Self::parse_feed(subject, xml, req.max_items, None),
            Mode::Http {
                feed_prefix,
                client,
                timeout,
            } => {
                let url = format!("{feed_prefix}{subject}");
                let resp = client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| ProviderError::from_reqwest(e, *timeout))?;
                let body = read_body(resp, *timeout).await?;
                let cutoff = time::Duration::try_from(req.lookback)
                    .ok()
                    .filter(|d| !d.is_zero())
                    .and_then(|d| OffsetDateTime::now_utc().checked_sub(d));
                Self::parse_feed(subject, &body, req.max_items, cutoff)
            }
        }
    }

    fn name(&self) -> &'static str {
        "news_rss"
    }
}

/// quick-xml only knows the five XML entities; feeds routinely carry HTML ones.
fn scrub_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
