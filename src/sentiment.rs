//! Three-way tone classification from a bundled lexicon.
//!
//! The lexicon maps lower-case terms to signed strengths. A term preceded by a
//! negator within three tokens flips sign. The sign of the total decides the
//! tone; a zero total (or no known terms) is neutral.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).unwrap_or_else(|e| {
        tracing::error!(error = %e, "bundled sentiment lexicon is invalid; every item will be neutral");
        HashMap::new()
    })
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Bullish,
    Bearish,
    Neutral,
}

impl Tone {
    pub fn sign(&self) -> f64 {
        match self {
            Tone::Bullish => 1.0,
            Tone::Bearish => -1.0,
            Tone::Neutral => 0.0,
        }
    }

    /// Parse an externally supplied label. Unknown labels yield `None` so the
    /// caller can fall back to the lexicon.
    pub fn from_label(label: &str) -> Option<Tone> {
        match label.trim().to_ascii_lowercase().as_str() {
            "bullish" | "bull" | "positive" => Some(Tone::Bullish),
            "bearish" | "bear" | "negative" => Some(Tone::Bearish),
            "neutral" => Some(Tone::Neutral),
            _ => None,
        }
    }

    pub fn from_score(score: i32) -> Tone {
        match score.signum() {
            1 => Tone::Bullish,
            -1 => Tone::Bearish,
            _ => Tone::Neutral,
        }
    }
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tone::Bullish => write!(f, "bullish"),
            Tone::Bearish => write!(f, "bearish"),
            Tone::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToneClassifier;

impl ToneClassifier {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_score(&self, w: &str) -> i32 {
        *LEXICON.get(w).unwrap_or(&0)
    }

    /// Returns (score, token count).
    pub fn score_text(&self, text: &str) -> (i32, usize) {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut score: i32 = 0;

        for i in 0..tokens.len() {
            let base = self.word_score(tokens[i].as_str());
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            score += if negated { -base } else { base };
        }

        (score, tokens.len())
    }

    /// External label wins when it is recognizable; otherwise the lexicon decides.
    pub fn classify(&self, text: &str, label: Option<&str>) -> Tone {
        if let Some(tone) = label.and_then(Tone::from_label) {
            return tone;
        }
        Tone::from_score(self.score_text(text).0)
    }
}

/// Lower-case alphanumeric tokens; apostrophes stay inside words ("isn't").
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn't"
            | "wasn't"
            | "aren't"
            | "won't"
            | "can't"
            | "cannot"
            | "don't"
            | "without"
    )
}
