//! Engagement-weighted scoring.
//!
//! weight = sign(tone) * base_magnitude * amplifier
//! amplifier = 1 + amplifier_scale * log_base(1 + likes + reposts)
//!
//! The logarithm keeps one viral post from outweighing many ordinary ones:
//! doubling engagement adds at most `amplifier_scale * log_base(2)`.

use crate::ingest::config::ScoringConfig;
use crate::ingest::types::Item;
use crate::sentiment::{Tone, ToneClassifier};

#[derive(Debug, Clone)]
pub struct Scorer {
    classifier: ToneClassifier,
    cfg: ScoringConfig,
}

impl Scorer {
    pub fn new(cfg: ScoringConfig) -> Self {
        Self {
            classifier: ToneClassifier::new(),
            cfg,
        }
    }

    pub fn amplifier(&self, engagement: f64) -> f64 {
        let e = if engagement.is_finite() { engagement.max(0.0) } else { 0.0 };
        1.0 + self.cfg.amplifier_scale * (1.0 + e).log(self.cfg.log_base)
    }

    /// Always finite; neutral items weigh zero.
    pub fn weight(&self, tone: Tone, engagement: f64) -> f64 {
        let w = tone.sign() * self.cfg.base_magnitude * self.amplifier(engagement);
        if w.is_finite() {
            w
        } else {
            0.0
        }
    }

    pub fn score(&self, item: &mut Item) {
        item.tone = self.classifier.classify(&item.text, item.label.as_deref());
        item.weight = self.weight(item.tone, item.engagement_score);
    }

    pub fn score_all(&self, items: &mut [Item]) {
        for it in items.iter_mut() {
            self.score(it);
        }
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}
