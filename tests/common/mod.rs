// tests/common/mod.rs
// Shared builders and a scripted provider for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sentiment_pulse::error::{CacheWriteError, ProviderError};
use sentiment_pulse::ingest::config::IngestConfig;
use sentiment_pulse::ingest::types::{FetchRequest, RawItem, SourceProvider};
use sentiment_pulse::snapshot::store::SnapshotStore;
use sentiment_pulse::snapshot::Snapshot;

pub fn raw(subject: &str, provider: &str, id: &str, text: &str, engagement: i64) -> RawItem {
    RawItem {
        subject: subject.into(),
        source_id: Some(id.into()),
        author: Some(format!("user_{id}")),
        text: Some(text.into()),
        timestamp: Some("2024-06-11T14:00:00Z".into()),
        likes: Some(engagement),
        reposts: Some(0),
        provider: provider.into(),
        label: None,
        url: None,
    }
}

pub fn labeled(subject: &str, id: &str, label: &str, engagement: i64) -> RawItem {
    let mut r = raw(subject, "scripted", id, "post body", engagement);
    r.label = Some(label.into());
    r
}

/// Config with fast retries and no persistence, for deterministic tests.
pub fn test_config(subjects: &[&str]) -> IngestConfig {
    let mut cfg = IngestConfig {
        subjects: subjects.iter().map(|s| s.to_string()).collect(),
        snapshot_path: String::new(),
        provider_timeout_secs: 2,
        ..Default::default()
    };
    cfg.retry.max_attempts = 1;
    cfg.retry.initial_delay_ms = 1;
    cfg.retry.max_delay_ms = 1;
    cfg
}

/// Returns a fixed response per subject and counts calls. Unknown subjects
/// get an empty list.
pub struct ScriptedProvider {
    name: &'static str,
    responses: Mutex<HashMap<String, Result<Vec<RawItem>, ProviderError>>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            responses: Mutex::new(HashMap::new()),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(self, subject: &str, resp: Result<Vec<RawItem>, ProviderError>) -> Self {
        self.set(subject, resp);
        self
    }

    pub fn with_delay(self, d: Duration) -> Self {
        *self.delay.lock() = d;
        self
    }

    pub fn set(&self, subject: &str, resp: Result<Vec<RawItem>, ProviderError>) {
        self.responses.lock().insert(subject.to_string(), resp);
    }

    pub fn set_delay(&self, d: Duration) {
        *self.delay.lock() = d;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait::async_trait]
impl SourceProvider for ScriptedProvider {
    async fn fetch(&self, subject: &str, req: &FetchRequest) -> Result<Vec<RawItem>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let resp = self
            .responses
            .lock()
            .get(subject)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()));
        resp.map(|mut v| {
            v.truncate(req.max_items);
            v
        })
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

pub fn as_providers(ps: &[Arc<ScriptedProvider>]) -> Vec<Arc<dyn SourceProvider>> {
    ps.iter()
        .map(|p| p.clone() as Arc<dyn SourceProvider>)
        .collect()
}

/// In-memory snapshot store that records every save; can be told to fail.
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Vec<Snapshot>>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            saved: Mutex::new(Vec::new()),
            fail_writes: true,
        }
    }

    pub fn with_snapshot(s: Snapshot) -> Self {
        Self {
            saved: Mutex::new(vec![s]),
            fail_writes: false,
        }
    }

    pub fn save_count(&self) -> usize {
        self.saved.lock().len()
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemoryStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), CacheWriteError> {
        if self.fail_writes {
            return Err(CacheWriteError::Io {
                path: "memory".into(),
                source: std::io::Error::other("write disabled"),
            });
        }
        self.saved.lock().push(snapshot.clone());
        Ok(())
    }

    async fn load(&self) -> Option<Snapshot> {
        self.saved.lock().last().cloned()
    }
}
