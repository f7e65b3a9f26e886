// src/ingest/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::snapshot::META_KEY;

pub const ENV_CONFIG_PATH: &str = "INGEST_CONFIG_PATH";
pub const ENV_REFRESH_INTERVAL: &str = "REFRESH_INTERVAL_SECS";
pub const ENV_SNAPSHOT_PATH: &str = "SNAPSHOT_PATH";

/// Longest accepted lookback window (30 days).
pub const MAX_LOOKBACK_HOURS: u64 = 24 * 30;

/// Everything the ingestion cycle, cache and scheduler can be tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub subjects: Vec<String>,
    pub providers: ProviderToggles,
    pub lookback_hours: u64,
    pub max_items: usize,
    pub refresh_interval_secs: u64,
    pub snapshot_ttl_secs: u64,
    pub max_parallel_fetches: usize,
    pub provider_timeout_secs: u64,
    pub force_refresh_timeout_secs: u64,
    /// Minimum gap between the last cycle and one triggered by a stale read.
    pub stale_refresh_cooldown_secs: u64,
    /// Empty string disables durable persistence.
    pub snapshot_path: String,
    pub history: HistoryConfig,
    pub tiers: TierConfig,
    pub scoring: ScoringConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderToggles {
    pub stocktwits: bool,
    pub x: bool,
    pub news_rss: bool,
    /// FRED-backed bullets for topic subjects such as `INFLATION`.
    pub macro_trends: bool,
    pub sample: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub retention: usize,
    /// Synthetic points seeded before the first real capture; 0 disables.
    pub backfill_points: usize,
    pub backfill_noise: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub high_percentile: f64,
    pub medium_percentile: f64,
    /// Require an item to strictly exceed the next lower cut, so ties at a
    /// cut point fall one tier down. Off by default.
    pub strict_ties: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub base_magnitude: f64,
    pub log_base: f64,
    pub amplifier_scale: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            subjects: vec!["AAPL".into(), "TSLA".into(), "NVDA".into()],
            providers: ProviderToggles::default(),
            lookback_hours: 12,
            max_items: 50,
            refresh_interval_secs: 1800,
            snapshot_ttl_secs: 3600,
            max_parallel_fetches: 4,
            provider_timeout_secs: 10,
            force_refresh_timeout_secs: 20,
            stale_refresh_cooldown_secs: 300,
            snapshot_path: "data/snapshot.json".into(),
            history: HistoryConfig::default(),
            tiers: TierConfig::default(),
            scoring: ScoringConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for ProviderToggles {
    fn default() -> Self {
        Self {
            stocktwits: true,
            x: false,
            news_rss: true,
            macro_trends: false,
            sample: false,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        // 48 captures = one day at the default 30 min interval.
        Self {
            retention: 48,
            backfill_points: 0,
            backfill_noise: 4.0,
        }
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            high_percentile: 90.0,
            medium_percentile: 50.0,
            strict_ties: false,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_magnitude: 1.0,
            log_base: 10.0,
            amplifier_scale: 1.0,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl IngestConfig {
    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_hours.min(MAX_LOOKBACK_HOURS) * 3600)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs.max(1))
    }

    pub fn force_refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.force_refresh_timeout_secs)
    }

    pub fn stale_refresh_cooldown(&self) -> Duration {
        Duration::from_secs(self.stale_refresh_cooldown_secs)
    }

    pub fn snapshot_path(&self) -> Option<PathBuf> {
        let p = self.snapshot_path.trim();
        (!p.is_empty()).then(|| PathBuf::from(p))
    }

    /// Normalize subjects in place and reject inconsistent settings.
    pub fn validate(mut self) -> Result<Self> {
        self.subjects = clean_subjects(std::mem::take(&mut self.subjects))?;
        if self.subjects.is_empty() {
            bail!("config lists no subjects");
        }
        let t = &self.tiers;
        let in_range = |p: f64| p > 0.0 && p <= 100.0;
        if !in_range(t.high_percentile) || !in_range(t.medium_percentile) {
            bail!("tier percentiles must be within (0, 100]");
        }
        if t.high_percentile < t.medium_percentile {
            bail!("high_percentile must not be below medium_percentile");
        }
        if !(self.scoring.log_base > 1.0) {
            bail!("scoring.log_base must be greater than 1");
        }
        if self.scoring.base_magnitude <= 0.0 || self.scoring.amplifier_scale < 0.0 {
            bail!("scoring.base_magnitude must be positive and amplifier_scale non-negative");
        }
        if self.history.retention == 0 {
            bail!("history.retention must be at least 1");
        }
        if self.lookback_hours > MAX_LOOKBACK_HOURS {
            bail!("lookback_hours must be at most {MAX_LOOKBACK_HOURS}");
        }
        if self.max_parallel_fetches == 0 {
            bail!("max_parallel_fetches must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        Ok(self)
    }

    fn apply_env_overrides(mut self) -> Result<Self> {
        if let Ok(v) = std::env::var(ENV_REFRESH_INTERVAL) {
            self.refresh_interval_secs = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_REFRESH_INTERVAL} is not a number: {v}"))?;
        }
        if let Ok(v) = std::env::var(ENV_SNAPSHOT_PATH) {
            self.snapshot_path = v;
        }
        Ok(self)
    }
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<IngestConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading ingest config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())?
        .apply_env_overrides()?
        .validate()
}

/// Load config using env var + fallbacks:
/// 1) $INGEST_CONFIG_PATH
/// 2) config/ingest.toml
/// 3) config/ingest.json
/// 4) built-in defaults
pub fn load_config_default() -> Result<IngestConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        } else {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/ingest.toml");
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    let json_p = PathBuf::from("config/ingest.json");
    if json_p.exists() {
        return load_config_from(&json_p);
    }
    IngestConfig::default().apply_env_overrides()?.validate()
}

fn parse_config(s: &str, hint_ext: &str) -> Result<IngestConfig> {
    if hint_ext == "json" {
        return serde_json::from_str(s).context("parsing ingest config json");
    }
    if hint_ext == "toml" {
        return toml::from_str(s).context("parsing ingest config toml");
    }
    // Unknown extension: JSON starts with a brace, everything else is TOML.
    if s.trim_start().starts_with('{') {
        serde_json::from_str(s).context("parsing ingest config json")
    } else {
        toml::from_str(s).context("parsing ingest config toml")
    }
}

/// Trim, strip cashtag `$`, upper-case, drop duplicates keeping first order.
pub fn normalize_subject(raw: &str) -> String {
    raw.trim().trim_start_matches('$').trim().to_ascii_uppercase()
}

fn clean_subjects(items: Vec<String>) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let s = normalize_subject(&it);
        if s.is_empty() {
            continue;
        }
        if s.starts_with('_') || s.eq_ignore_ascii_case(META_KEY) {
            bail!("subject name '{s}' is reserved");
        }
        if !out.contains(&s) {
            out.push(s);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_are_cleaned_and_deduplicated() {
        let cfg = IngestConfig {
            subjects: vec![" $aapl ".into(), "AAPL".into(), "".into(), "tsla".into()],
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(cfg.subjects, vec!["AAPL".to_string(), "TSLA".to_string()]);
    }

    #[test]
    fn reserved_subject_is_rejected() {
        let cfg = IngestConfig {
            subjects: vec!["_meta".into()],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn inverted_percentiles_are_rejected() {
        let mut cfg = IngestConfig::default();
        cfg.tiers.high_percentile = 40.0;
        cfg.tiers.medium_percentile = 60.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn lookback_is_bounded() {
        let mut cfg = IngestConfig::default();
        cfg.lookback_hours = u64::MAX;
        assert!(cfg.clone().validate().is_err());
        // Even unvalidated, the window never overflows.
        assert_eq!(cfg.lookback(), Duration::from_secs(MAX_LOOKBACK_HOURS * 3600));
        // Zero disables the window.
        cfg.lookback_hours = 0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: IngestConfig = parse_config(
            r#"
subjects = ["NVDA"]
[history]
retention = 10
"#,
            "toml",
        )
        .unwrap();
        assert_eq!(cfg.subjects, vec!["NVDA".to_string()]);
        assert_eq!(cfg.history.retention, 10);
        assert_eq!(cfg.history.backfill_points, 0);
        assert_eq!(cfg.max_items, 50);
        assert!((cfg.tiers.high_percentile - 90.0).abs() < f64::EPSILON);
    }
}
