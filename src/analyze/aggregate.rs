//! Per-subject fold of scored items into a `Summary`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::config::TierConfig;
use crate::ingest::types::Item;
use crate::sentiment::Tone;

pub const TOP_ITEMS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementTier {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementTiers {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl EngagementTiers {
    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopItem {
    pub id: String,
    pub provider: String,
    pub author: String,
    pub text: String,
    pub url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub tone: Tone,
    pub weight: f64,
    pub likes: u64,
    pub reposts: u64,
    pub tier: EngagementTier,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub subject: String,
    pub post_count: usize,
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub neutral_count: usize,
    pub net_score: f64,
    pub engagement_tiers: EngagementTiers,
    pub top_items: Vec<TopItem>,
}

impl Summary {
    pub fn empty(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            post_count: 0,
            bullish_count: 0,
            bearish_count: 0,
            neutral_count: 0,
            net_score: 0.0,
            engagement_tiers: EngagementTiers::default(),
            top_items: Vec::new(),
        }
    }
}

/// Nearest-rank percentile over an ascending, non-empty slice.
pub fn nearest_rank(sorted: &[f64], pct: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let n = sorted.len();
    let rank = ((pct / 100.0) * n as f64).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}

/// Cut points for one cycle's engagement distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierCuts {
    pub high: f64,
    pub medium: f64,
    pub min: f64,
    pub strict_ties: bool,
}

impl TierCuts {
    pub fn from_scores(scores: &[f64], cfg: &TierConfig) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        let mut sorted = scores.to_vec();
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            high: nearest_rank(&sorted, cfg.high_percentile),
            medium: nearest_rank(&sorted, cfg.medium_percentile),
            min: sorted[0],
            strict_ties: cfg.strict_ties,
        })
    }

    /// `e >= P_high` is high, `e >= P_medium` is medium, anything else low.
    /// With `strict_ties` an item must also exceed the next lower cut.
    pub fn classify(&self, e: f64) -> EngagementTier {
        let (above_medium, above_min) = if self.strict_ties {
            (e > self.medium, e > self.min)
        } else {
            (true, true)
        };
        if e >= self.high && above_medium {
            EngagementTier::High
        } else if e >= self.medium && above_min {
            EngagementTier::Medium
        } else {
            EngagementTier::Low
        }
    }
}

/// Fold scored, deduplicated items. Deterministic for identical input sets
/// regardless of arrival order.
pub fn aggregate(subject: &str, mut items: Vec<Item>, tiers: &TierConfig) -> Summary {
    if items.is_empty() {
        return Summary::empty(subject);
    }

    items.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

    let mut summary = Summary::empty(subject);
    summary.post_count = items.len();

    let mut sum = 0.0f64;
    let mut abs_sum = 0.0f64;
    for it in &items {
        match it.tone {
            Tone::Bullish => summary.bullish_count += 1,
            Tone::Bearish => summary.bearish_count += 1,
            Tone::Neutral => summary.neutral_count += 1,
        }
        sum += it.weight;
        abs_sum += it.weight.abs();
    }
    summary.net_score = net_score(sum, abs_sum);

    let scores: Vec<f64> = items.iter().map(|i| i.engagement_score).collect();
    let cuts = TierCuts::from_scores(&scores, tiers);
    let tier_of = |e: f64| cuts.map_or(EngagementTier::Low, |c| c.classify(e));

    for it in &items {
        match tier_of(it.engagement_score) {
            EngagementTier::High => summary.engagement_tiers.high += 1,
            EngagementTier::Medium => summary.engagement_tiers.medium += 1,
            EngagementTier::Low => summary.engagement_tiers.low += 1,
        }
    }

    let mut ranked: Vec<&Item> = items.iter().collect();
    ranked.sort_by(|a, b| {
        b.weight
            .abs()
            .total_cmp(&a.weight.abs())
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| a.id.cmp(&b.id))
    });
    summary.top_items = ranked
        .into_iter()
        .take(TOP_ITEMS)
        .map(|it| TopItem {
            id: it.id.clone(),
            provider: it.provider.clone(),
            author: it.author.clone(),
            text: it.text.clone(),
            url: it.url.clone(),
            timestamp: it.timestamp,
            tone: it.tone,
            weight: round2(it.weight),
            likes: it.likes,
            reposts: it.reposts,
            tier: tier_of(it.engagement_score),
            tags: it.tags.clone(),
        })
        .collect();

    summary
}

fn net_score(sum: f64, abs_sum: f64) -> f64 {
    if abs_sum <= 0.0 || !abs_sum.is_finite() {
        return 0.0;
    }
    round2((100.0 * sum / abs_sum).clamp(-100.0, 100.0))
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
