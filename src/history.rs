//! history.rs — rolling per-subject series of cycle results.
//!
//! Series live inside the published snapshot; this module only holds the
//! append/retention/backfill policy and never mutates a point after append.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::analyze::Summary;
use crate::ingest::config::HistoryConfig;
use crate::ingest::normalize::hex_digest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub net_score: f64,
    pub post_count: usize,
    /// Backfilled for rendering only; not a real capture.
    #[serde(default)]
    pub synthetic: bool,
}

impl HistoryPoint {
    pub fn capture(summary: &Summary, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at,
            net_score: summary.net_score,
            post_count: summary.post_count,
            synthetic: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryTracker {
    cfg: HistoryConfig,
    spacing: Duration,
}

impl HistoryTracker {
    /// `spacing` is the gap between synthetic points (the refresh interval).
    pub fn new(cfg: HistoryConfig, spacing: Duration) -> Self {
        Self {
            cfg,
            spacing: spacing.max(Duration::from_secs(1)),
        }
    }

    pub fn retention(&self) -> usize {
        self.cfg.retention.max(1)
    }

    /// Append one capture. An empty series is seeded first when backfill is on.
    pub fn append(
        &self,
        subject: &str,
        series: &mut Vec<HistoryPoint>,
        summary: &Summary,
        at: DateTime<Utc>,
    ) {
        let point = HistoryPoint::capture(summary, at);
        if series.is_empty() && self.cfg.backfill_points > 0 {
            series.extend(self.backfill(subject, &point));
        }
        series.push(point);

        let cap = self.retention();
        if series.len() > cap {
            let excess = series.len() - cap;
            series.drain(0..excess);
        }
    }

    /// Interpolate from a neutral baseline up to `first`, with bounded noise.
    /// Seeded from the subject so repeated runs produce the same curve.
    pub fn backfill(&self, subject: &str, first: &HistoryPoint) -> Vec<HistoryPoint> {
        let n = self.cfg.backfill_points;
        let noise = self.cfg.backfill_noise.abs();
        let mut rng = StdRng::seed_from_u64(subject_seed(subject));
        let step = chrono::Duration::from_std(self.spacing).unwrap_or(chrono::Duration::hours(1));

        (0..n)
            .map(|i| {
                let frac = (i + 1) as f64 / (n + 1) as f64;
                let jitter = if noise > 0.0 {
                    rng.random_range(-noise..=noise)
                } else {
                    0.0
                };
                let value = (first.net_score * frac + jitter).clamp(-100.0, 100.0);
                HistoryPoint {
                    timestamp: first.timestamp - step * (n - i) as i32,
                    net_score: (value * 100.0).round() / 100.0,
                    post_count: first.post_count,
                    synthetic: true,
                }
            })
            .collect()
    }
}

fn subject_seed(subject: &str) -> u64 {
    let hex = hex_digest(&[subject]);
    u64::from_str_radix(&hex[..16], 16).unwrap_or(0)
}
