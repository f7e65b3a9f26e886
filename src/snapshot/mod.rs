// src/snapshot/mod.rs
//! Copy-on-publish snapshot cache.
//!
//! Readers get an `Arc<Snapshot>` and never lock against the writer. Each
//! cycle clones the current snapshot, applies its changes, and swaps the whole
//! thing in with a single `watch::Sender::send_replace`. Publishers are
//! serialized by an async mutex.

pub mod store;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};

use crate::analyze::{Scorer, Summary};
use crate::history::{HistoryPoint, HistoryTracker};
use crate::ingest::config::TierConfig;
use crate::ingest::providers::SampleProvider;
use crate::ingest::scheduler::RefreshSignal;
use crate::ingest::{process_subject, CycleReport, ProviderOutcome};
use crate::snapshot::store::SnapshotStore;

/// Key of the internal meta record in the durable document.
pub const META_KEY: &str = "_meta";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub summaries: BTreeMap<String, Summary>,
    #[serde(default)]
    pub history: BTreeMap<String, Vec<HistoryPoint>>,
    #[serde(rename = "_meta", default)]
    pub meta: SnapshotMeta,
}

impl Snapshot {
    /// Subject-facing listing; the meta record is never part of it.
    pub fn subjects(&self) -> Vec<String> {
        self.summaries.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotOrigin {
    #[default]
    Empty,
    Bundled,
    Durable,
    Cycle,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotMeta {
    /// Last cycle that published at least one subject.
    pub last_refreshed: Option<DateTime<Utc>>,
    /// Last cycle that ran at all, including all-failed ones.
    pub last_run: Option<DateTime<Utc>>,
    pub generation: u64,
    pub origin: SnapshotOrigin,
    pub provider_status: BTreeMap<String, SubjectStatus>,
    pub provider_counts: ProviderCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubjectStatus {
    pub last_success: Option<DateTime<Utc>>,
    pub providers: BTreeMap<String, ProviderOutcome>,
    pub rejected: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCounts {
    pub ok: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Empty,
    Warm,
    Stale,
}

/// What a reader gets: the snapshot plus freshness annotations.
#[derive(Debug, Clone)]
pub struct SnapshotView {
    pub snapshot: Arc<Snapshot>,
    pub state: CacheState,
    pub age: Option<Duration>,
    pub stale_subjects: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// At least one subject got a fresh summary.
    Published { generation: u64 },
    /// Every subject failed; only provider status changed.
    MetaOnly { generation: u64 },
}

pub struct SnapshotCache {
    tx: watch::Sender<Arc<Snapshot>>,
    publish: Mutex<()>,
    history: HistoryTracker,
    ttl: Duration,
    store: Option<Arc<dyn SnapshotStore>>,
    refresh: Arc<RefreshSignal>,
}

impl SnapshotCache {
    pub fn new(
        history: HistoryTracker,
        ttl: Duration,
        store: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Snapshot::default()));
        Self {
            tx,
            publish: Mutex::new(()),
            history,
            ttl,
            store,
            refresh: Arc::new(RefreshSignal::new()),
        }
    }

    /// Hold stale-read refreshes back until `cooldown` has passed since the
    /// last cycle finished.
    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh = Arc::new(RefreshSignal::with_background_cooldown(cooldown));
        self
    }

    pub fn refresh_signal(&self) -> Arc<RefreshSignal> {
        self.refresh.clone()
    }

    /// Current snapshot; never blocks on a running cycle.
    pub fn current(&self) -> Arc<Snapshot> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    /// Read with freshness. A stale view asks for a background refresh
    /// (coalesced with any pending or running cycle, throttled by the refresh
    /// cooldown) and is served anyway.
    pub fn get_snapshot(&self) -> SnapshotView {
        let view = self.view_at(Utc::now());
        if view.state == CacheState::Stale {
            self.refresh.request_background();
        }
        view
    }

    pub fn view_at(&self, now: DateTime<Utc>) -> SnapshotView {
        let snapshot = self.current();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let age = snapshot
            .meta
            .last_refreshed
            .map(|t| (now - t).to_std().unwrap_or(Duration::ZERO));

        let state = match snapshot.meta.origin {
            SnapshotOrigin::Empty => CacheState::Empty,
            SnapshotOrigin::Bundled => CacheState::Stale,
            SnapshotOrigin::Durable | SnapshotOrigin::Cycle => match snapshot.meta.last_refreshed {
                Some(t) if now - t <= ttl => CacheState::Warm,
                _ => CacheState::Stale,
            },
        };

        let stale_subjects = snapshot
            .summaries
            .keys()
            .filter(|s| {
                let last = snapshot
                    .meta
                    .provider_status
                    .get(*s)
                    .and_then(|st| st.last_success);
                !matches!(last, Some(t) if now - t <= ttl)
            })
            .cloned()
            .collect();

        SnapshotView {
            snapshot,
            state,
            age,
            stale_subjects,
        }
    }

    /// Hydrate from the durable store, else from `fallback`. Returns the origin
    /// that ended up installed.
    pub async fn hydrate(&self, fallback: Option<Snapshot>) -> SnapshotOrigin {
        if let Some(store) = &self.store {
            if let Some(mut s) = store.load().await {
                s.meta.origin = SnapshotOrigin::Durable;
                tracing::info!(
                    target: "snapshot",
                    subjects = s.summaries.len(),
                    last_refreshed = ?s.meta.last_refreshed,
                    "hydrated snapshot from durable store"
                );
                self.install(s).await;
                return SnapshotOrigin::Durable;
            }
        }
        match fallback {
            Some(mut s) => {
                s.meta.origin = SnapshotOrigin::Bundled;
                tracing::info!(target: "snapshot", subjects = s.summaries.len(), "serving bundled fallback snapshot");
                self.install(s).await;
                SnapshotOrigin::Bundled
            }
            None => SnapshotOrigin::Empty,
        }
    }

    async fn install(&self, s: Snapshot) {
        let _g = self.publish.lock().await;
        self.tx.send_replace(Arc::new(s));
    }

    /// Fold one cycle into a new snapshot and publish it in one step.
    /// Subjects whose providers all failed keep summary and history as-is.
    pub async fn apply_cycle(&self, report: &CycleReport) -> PublishOutcome {
        let _g = self.publish.lock().await;
        let mut next: Snapshot = (*self.current()).clone();
        let at = report.finished_at;
        let mut counts = ProviderCounts::default();

        for outcome in &report.subjects {
            for p in outcome.providers.values() {
                if p.is_ok() {
                    counts.ok += 1;
                } else {
                    counts.failed += 1;
                }
            }

            let status = next
                .meta
                .provider_status
                .entry(outcome.subject.clone())
                .or_default();
            status.providers = outcome.providers.clone();

            if let Some(summary) = &outcome.summary {
                status.last_success = Some(at);
                status.rejected = outcome.rejected;
                status.duplicates = outcome.duplicates;
                let series = next.history.entry(outcome.subject.clone()).or_default();
                self.history.append(&outcome.subject, series, summary, at);
                next.summaries.insert(outcome.subject.clone(), summary.clone());
            }
        }

        next.meta.provider_counts = counts;
        next.meta.last_run = Some(at);
        next.meta.generation += 1;
        let generation = next.meta.generation;

        let outcome = if report.any_succeeded() {
            next.meta.last_refreshed = Some(at);
            next.meta.origin = SnapshotOrigin::Cycle;
            PublishOutcome::Published { generation }
        } else {
            PublishOutcome::MetaOnly { generation }
        };

        let next = Arc::new(next);
        self.tx.send_replace(next.clone());
        counter!("snapshot_publish_total").increment(1);
        if let Some(t) = next.meta.last_refreshed {
            gauge!("snapshot_last_refresh_ts").set(t.timestamp() as f64);
        }
        tracing::info!(target: "snapshot", generation, ?outcome, "snapshot published");

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&next).await {
                counter!("snapshot_persist_errors_total").increment(1);
                tracing::warn!(target: "snapshot", error = %e, "durable snapshot write failed; live view unaffected");
            }
        }

        outcome
    }
}

/// Snapshot built from the bundled sample posts, for when nothing durable
/// exists yet. Subjects without sample data are simply absent.
pub fn bundled_fallback(
    subjects: &[String],
    scorer: &Scorer,
    tiers: &TierConfig,
    history: &HistoryTracker,
) -> Snapshot {
    let sample = SampleProvider::bundled();
    let mut snap = Snapshot::default();
    for subject in subjects {
        let raw = match sample.posts_for(subject, usize::MAX) {
            Ok(r) if !r.is_empty() => r,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(target: "snapshot", error = %e, "bundled sample unusable");
                return snap;
            }
        };
        let processed = process_subject(subject, raw, scorer, tiers);
        let Some(at) = processed.items.iter().map(|i| i.timestamp).max() else {
            continue;
        };
        let series = snap.history.entry(subject.clone()).or_default();
        history.append(subject, series, &processed.summary, at);
        snap.summaries.insert(subject.clone(), processed.summary);
    }
    snap.meta.origin = SnapshotOrigin::Bundled;
    snap
}
