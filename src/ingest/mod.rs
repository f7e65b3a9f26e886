// src/ingest/mod.rs
pub mod config;
pub mod dedup;
pub mod normalize;
pub mod providers;
pub mod retry;
pub mod scheduler;
pub mod tagger;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::analyze::{aggregate, Scorer, Summary};
use crate::error::{ProviderError, ProviderErrorKind};
use crate::ingest::config::{IngestConfig, TierConfig};
use crate::ingest::normalize::{normalize_all, NormalizeStats};
use crate::ingest::providers::fetch_guarded;
use crate::ingest::retry::RetryPolicy;
use crate::ingest::types::{FetchRequest, Item, RawItem, SourceProvider};

pub use crate::ingest::normalize::normalize_text;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_cycles_total", "Ingestion cycles run.");
        describe_counter!(
            "ingest_items_total",
            "Items kept after normalization and dedup."
        );
        describe_counter!(
            "ingest_rejected_total",
            "Raw items dropped by the normalizer."
        );
        describe_counter!(
            "ingest_dedup_total",
            "Items removed as duplicates within a cycle."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch failures by provider and kind."
        );
        describe_histogram!("ingest_cycle_ms", "Wall time of one ingestion cycle in milliseconds.");
        describe_counter!("snapshot_publish_total", "Snapshots published to readers.");
        describe_counter!(
            "snapshot_persist_errors_total",
            "Durable snapshot writes that failed."
        );
        describe_gauge!(
            "snapshot_last_refresh_ts",
            "Unix ts of the last published snapshot."
        );
    });
}

/// What one provider contributed to one subject in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProviderOutcome {
    Ok { items: usize },
    Failed { kind: ProviderErrorKind },
}

impl ProviderOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ProviderOutcome::Ok { .. })
    }
}

/// Pure result of normalize -> dedup -> score -> aggregate for one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedSubject {
    pub items: Vec<Item>,
    pub summary: Summary,
    pub rejected: NormalizeStats,
    pub duplicates: usize,
}

/// Deterministic for identical `raw` input (same order, same content).
pub fn process_subject(
    subject: &str,
    raw: Vec<RawItem>,
    scorer: &Scorer,
    tiers: &TierConfig,
) -> ProcessedSubject {
    let mut rejected = NormalizeStats::default();
    let normalized = normalize_all(raw, &mut rejected);
    let (mut items, duplicates) = dedup::dedup_first_seen(normalized);
    scorer.score_all(&mut items);
    let summary = aggregate(subject, items.clone(), tiers);
    ProcessedSubject {
        items,
        summary,
        rejected,
        duplicates,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectOutcome {
    pub subject: String,
    /// `None` when every provider failed; the previous summary must stay.
    pub summary: Option<Summary>,
    pub providers: BTreeMap<String, ProviderOutcome>,
    pub rejected: usize,
    pub duplicates: usize,
}

impl SubjectOutcome {
    pub fn succeeded(&self) -> bool {
        self.summary.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub subjects: Vec<SubjectOutcome>,
}

impl CycleReport {
    pub fn any_succeeded(&self) -> bool {
        self.subjects.iter().any(SubjectOutcome::succeeded)
    }
}

/// Fetches every (subject, provider) pair concurrently, bounded by a
/// semaphore, then folds each subject independently.
pub struct IngestPipeline {
    providers: Vec<Arc<dyn SourceProvider>>,
    scorer: Scorer,
    tiers: TierConfig,
    request: FetchRequest,
    timeout: Duration,
    retry: RetryPolicy,
    max_parallel: usize,
}

impl IngestPipeline {
    pub fn new(cfg: &IngestConfig, providers: Vec<Arc<dyn SourceProvider>>) -> Self {
        Self {
            providers,
            scorer: Scorer::new(cfg.scoring.clone()),
            tiers: cfg.tiers.clone(),
            request: FetchRequest {
                lookback: cfg.lookback(),
                max_items: cfg.max_items,
            },
            timeout: cfg.provider_timeout(),
            retry: RetryPolicy::from(&cfg.retry),
            max_parallel: cfg.max_parallel_fetches.max(1),
        }
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn tiers(&self) -> &TierConfig {
        &self.tiers
    }

    pub async fn run_cycle(&self, subjects: &[String]) -> CycleReport {
        ensure_metrics_described();
        let started_at = Utc::now();
        let t0 = Instant::now();

        let sem = Arc::new(Semaphore::new(self.max_parallel));
        let calls = subjects.iter().enumerate().flat_map(|(si, subject)| {
            let sem = sem.clone();
            self.providers.iter().map(move |p| {
                let sem = sem.clone();
                let provider = p.clone();
                async move {
                    // Never closed, so acquire cannot fail.
                    let _permit = sem.acquire_owned().await.ok();
                    let res = fetch_guarded(
                        provider.as_ref(),
                        subject,
                        &self.request,
                        self.timeout,
                        &self.retry,
                    )
                    .await;
                    (si, provider.name(), res)
                }
            })
        });
        let results = join_all(calls).await;

        let mut per_subject: Vec<(Vec<RawItem>, BTreeMap<String, ProviderOutcome>)> =
            subjects.iter().map(|_| (Vec::new(), BTreeMap::new())).collect();
        for (si, name, res) in results {
            let (raw, status) = &mut per_subject[si];
            let outcome = match res {
                Ok(items) => {
                    let n = items.len();
                    raw.extend(items);
                    ProviderOutcome::Ok { items: n }
                }
                Err(e) => {
                    record_provider_error(&subjects[si], name, &e);
                    ProviderOutcome::Failed { kind: e.kind() }
                }
            };
            status.insert(name.to_string(), outcome);
        }

        let mut outcomes = Vec::with_capacity(subjects.len());
        for (subject, (raw, providers)) in subjects.iter().zip(per_subject) {
            let any_ok = providers.values().any(ProviderOutcome::is_ok);
            if !any_ok {
                tracing::warn!(
                    target: "ingest",
                    subject = %subject,
                    "all providers failed; keeping previous summary"
                );
                outcomes.push(SubjectOutcome {
                    subject: subject.clone(),
                    summary: None,
                    providers,
                    rejected: 0,
                    duplicates: 0,
                });
                continue;
            }

            let processed = process_subject(subject, raw, &self.scorer, &self.tiers);
            let rejected = processed.rejected.total();
            counter!("ingest_items_total").increment(processed.items.len() as u64);
            counter!("ingest_rejected_total").increment(rejected as u64);
            counter!("ingest_dedup_total").increment(processed.duplicates as u64);
            tracing::debug!(
                target: "ingest",
                subject = %subject,
                kept = processed.items.len(),
                rejected,
                duplicates = processed.duplicates,
                net_score = processed.summary.net_score,
                "subject processed"
            );
            outcomes.push(SubjectOutcome {
                subject: subject.clone(),
                summary: Some(processed.summary),
                providers,
                rejected,
                duplicates: processed.duplicates,
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_cycle_ms").record(ms);
        counter!("ingest_cycles_total").increment(1);

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            subjects: outcomes,
        };
        tracing::info!(
            target: "ingest",
            subjects = report.subjects.len(),
            succeeded = report.subjects.iter().filter(|s| s.succeeded()).count(),
            elapsed_ms = ms as u64,
            "ingest cycle finished"
        );
        report
    }
}

fn record_provider_error(subject: &str, provider: &'static str, e: &ProviderError) {
    let kind = e.kind().as_str();
    tracing::warn!(target: "ingest", subject, provider, kind, error = %e, "provider error");
    counter!("ingest_provider_errors_total", "provider" => provider, "kind" => kind).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, provider: &str, text: &str) -> RawItem {
        RawItem {
            subject: "AAPL".into(),
            source_id: Some(id.into()),
            author: Some("a".into()),
            text: Some(text.into()),
            timestamp: Some("2024-06-11T14:00:00Z".into()),
            provider: provider.into(),
            ..Default::default()
        }
    }

    #[test]
    fn process_subject_counts_rejects_and_duplicates() {
        let mut empty = raw("3", "x", "   ");
        empty.text = Some("   ".into());
        let input = vec![
            raw("1", "stocktwits", "bullish breakout"),
            raw("1", "x", "bullish breakout, again"),
            raw("2", "x", "puts printing"),
            empty,
        ];
        let out = process_subject("AAPL", input, &Scorer::default(), &TierConfig::default());
        assert_eq!(out.summary.post_count, 2);
        assert_eq!(out.duplicates, 1);
        assert_eq!(out.rejected.empty_text, 1);
        assert_eq!(out.items[0].provider, "stocktwits");
    }

    #[test]
    fn provider_outcome_serializes_with_status_tag() {
        let ok = serde_json::to_value(ProviderOutcome::Ok { items: 3 }).unwrap();
        assert_eq!(ok, serde_json::json!({"status": "ok", "items": 3}));
        let failed = serde_json::to_value(ProviderOutcome::Failed {
            kind: ProviderErrorKind::Timeout,
        })
        .unwrap();
        assert_eq!(failed, serde_json::json!({"status": "failed", "kind": "timeout"}));
    }
}
