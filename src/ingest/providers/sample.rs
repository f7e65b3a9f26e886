use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ProviderError;
use crate::ingest::types::{FetchRequest, RawItem, SourceProvider};

pub const BUNDLED_SAMPLE: &str = include_str!("../../../data/sample_posts.json");

#[derive(Debug, Deserialize)]
struct SampleFile {
    #[serde(default)]
    symbols: HashMap<String, Vec<SamplePost>>,
}

#[derive(Debug, Deserialize)]
struct SamplePost {
    id: Option<String>,
    author: Option<String>,
    created_at: Option<String>,
    text: Option<String>,
    like_count: Option<i64>,
    repost_count: Option<i64>,
    sentiment: Option<String>,
}

/// Bundled representative posts for running without live credentials.
/// Timestamps are fixed, so the lookback window is not applied.
pub struct SampleProvider {
    body: String,
}

impl SampleProvider {
    pub fn bundled() -> Self {
        Self::from_fixture(BUNDLED_SAMPLE)
    }

    pub fn from_fixture(body: &str) -> Self {
        Self {
            body: body.to_string(),
        }
    }

    /// Subjects present in the sample file, sorted.
    pub fn subjects(&self) -> Result<Vec<String>, ProviderError> {
        let mut s: Vec<String> = Self::parse(&self.body)?.symbols.into_keys().collect();
        s.sort();
        Ok(s)
    }

    fn parse(body: &str) -> Result<SampleFile, ProviderError> {
        serde_json::from_str(body)
            .map_err(|e| ProviderError::MalformedResponse(format!("sample json: {e}")))
    }

    pub fn posts_for(&self, subject: &str, max_items: usize) -> Result<Vec<RawItem>, ProviderError> {
        let mut file = Self::parse(&self.body)?;
        let posts = file
            .symbols
            .remove(&subject.to_ascii_uppercase())
            .unwrap_or_default();
        Ok(posts
            .into_iter()
            .take(max_items)
            .map(|p| RawItem {
                subject: subject.to_string(),
                source_id: p.id,
                author: p.author,
                text: p.text,
                timestamp: p.created_at,
                likes: p.like_count,
                reposts: p.repost_count,
                provider: "sample".to_string(),
                label: p.sentiment,
                url: None,
            })
            .collect())
    }
}

#[async_trait]
impl SourceProvider for SampleProvider {
    async fn fetch(&self, subject: &str, req: &FetchRequest) -> Result<Vec<RawItem>, ProviderError> {
        self.posts_for(subject, req.max_items)
    }

    fn name(&self) -> &'static str {
        "sample"
    }
}
