// tests/snapshot_store.rs
//
// Durable store behavior: atomic replace, corrupt-file recovery, and the
// live view surviving write failures.
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{as_providers, labeled, test_config, MemoryStore, ScriptedProvider};
use sentiment_pulse::history::HistoryTracker;
use sentiment_pulse::ingest::config::HistoryConfig;
use sentiment_pulse::ingest::scheduler::refresh_once;
use sentiment_pulse::snapshot::store::{FileSnapshotStore, SnapshotStore};
use sentiment_pulse::snapshot::{CacheState, Snapshot, SnapshotCache, SnapshotOrigin};
use sentiment_pulse::Runtime;

fn file_runtime(dir: &tempfile::TempDir) -> (Runtime, Arc<ScriptedProvider>) {
    let p = ScriptedProvider::new("scripted")
        .with("AAPL", Ok(vec![labeled("AAPL", "1", "bullish", 4)]))
        .into_arc();
    let mut cfg = test_config(&["AAPL"]);
    cfg.snapshot_path = dir.path().join("state").join("snapshot.json").display().to_string();
    (Runtime::with_providers(cfg, as_providers(&[p.clone()])), p)
}

#[tokio::test]
async fn published_snapshot_is_written_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let (rt, _) = file_runtime(&dir);
    refresh_once(&rt.pipeline, &rt.cache, &rt.config.subjects).await;

    let state_dir = dir.path().join("state");
    let names: Vec<String> = std::fs::read_dir(&state_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["snapshot.json".to_string()]);

    let body = std::fs::read_to_string(state_dir.join("snapshot.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["summaries"]["AAPL"]["postCount"], 1);
    assert_eq!(json["_meta"]["generation"], 1);
    assert_eq!(json["_meta"]["origin"], "cycle");
}

#[tokio::test]
async fn restart_hydrates_from_the_durable_file() {
    let dir = tempfile::tempdir().unwrap();
    let (rt, _) = file_runtime(&dir);
    refresh_once(&rt.pipeline, &rt.cache, &rt.config.subjects).await;
    let written = rt.cache.current();

    let (restarted, _) = file_runtime(&dir);
    assert_eq!(restarted.hydrate().await, SnapshotOrigin::Durable);
    let loaded = restarted.cache.current();
    assert_eq!(loaded.summaries, written.summaries);
    assert_eq!(loaded.history, written.history);
    assert_eq!(loaded.meta.generation, written.meta.generation);
    assert_eq!(restarted.cache.get_snapshot().state, CacheState::Warm);
}

#[tokio::test]
async fn corrupt_file_falls_back_to_bundled_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("snapshot.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"{\"summaries\": {\"AAPL\": ").unwrap();

    let (rt, _) = file_runtime(&dir);
    assert_eq!(rt.hydrate().await, SnapshotOrigin::Bundled);
    let view = rt.cache.get_snapshot();
    assert_eq!(view.state, CacheState::Stale);
    assert!(view.snapshot.summaries.contains_key("AAPL"));
    assert_eq!(view.stale_subjects, vec!["AAPL".to_string()]);
}

#[tokio::test]
async fn reserved_keys_in_the_file_never_become_subjects() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    let doc = serde_json::json!({
        "summaries": {
            "_meta": {"subject": "_meta", "postCount": 0, "bullishCount": 0, "bearishCount": 0,
                      "neutralCount": 0, "netScore": 0.0,
                      "engagementTiers": {"high": 0, "medium": 0, "low": 0}, "topItems": []},
        },
        "history": {"_internal": []},
        "_meta": {"generation": 7}
    });
    std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

    let loaded = FileSnapshotStore::new(&path).load().await.unwrap();
    assert!(loaded.subjects().is_empty());
    assert!(loaded.history.is_empty());
    assert_eq!(loaded.meta.generation, 7);
}

#[tokio::test]
async fn missing_file_loads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSnapshotStore::new(dir.path().join("nope.json"));
    assert!(store.load().await.is_none());
}

#[tokio::test]
async fn failed_write_still_publishes_in_memory() {
    let p = ScriptedProvider::new("scripted")
        .with("AAPL", Ok(vec![labeled("AAPL", "1", "bearish", 2)]))
        .into_arc();
    let cfg = test_config(&["AAPL"]);
    let rt = Runtime::with_providers(cfg.clone(), as_providers(&[p]));

    let store = Arc::new(MemoryStore::failing());
    let cache = SnapshotCache::new(
        HistoryTracker::new(HistoryConfig::default(), Duration::from_secs(1800)),
        cfg.snapshot_ttl(),
        Some(store.clone() as Arc<dyn SnapshotStore>),
    );
    refresh_once(&rt.pipeline, &cache, &cfg.subjects).await;

    assert_eq!(store.save_count(), 0);
    let view = cache.get_snapshot();
    assert_eq!(view.state, CacheState::Warm);
    assert_eq!(view.snapshot.summaries["AAPL"].bearish_count, 1);
}

#[tokio::test]
async fn every_publish_is_saved() {
    let p = ScriptedProvider::new("scripted")
        .with("AAPL", Ok(vec![labeled("AAPL", "1", "bullish", 2)]))
        .into_arc();
    let cfg = test_config(&["AAPL"]);
    let rt = Runtime::with_providers(cfg.clone(), as_providers(&[p]));

    let store = Arc::new(MemoryStore::new());
    let cache = SnapshotCache::new(
        HistoryTracker::new(HistoryConfig::default(), Duration::from_secs(1800)),
        cfg.snapshot_ttl(),
        Some(store.clone() as Arc<dyn SnapshotStore>),
    );
    for _ in 0..3 {
        refresh_once(&rt.pipeline, &cache, &cfg.subjects).await;
    }
    assert_eq!(store.save_count(), 3);
    assert_eq!(store.load().await.map(|s| s.meta.generation), Some(3));
}

#[tokio::test]
async fn hydrate_without_store_or_fallback_stays_empty() {
    let cache = SnapshotCache::new(
        HistoryTracker::new(HistoryConfig::default(), Duration::from_secs(1800)),
        Duration::from_secs(3600),
        None,
    );
    assert_eq!(cache.hydrate(None).await, SnapshotOrigin::Empty);
    let view = cache.get_snapshot();
    assert_eq!(view.state, CacheState::Empty);
    assert!(view.age.is_none());
    assert_eq!(*view.snapshot, Snapshot::default());
}

#[tokio::test]
async fn durable_snapshot_wins_over_fallback() {
    let mut durable = Snapshot::default();
    durable.meta.generation = 41;
    durable.meta.last_refreshed = Some(chrono::Utc::now());
    let store = Arc::new(MemoryStore::with_snapshot(durable));
    let cache = SnapshotCache::new(
        HistoryTracker::new(HistoryConfig::default(), Duration::from_secs(1800)),
        Duration::from_secs(3600),
        Some(store as Arc<dyn SnapshotStore>),
    );

    let mut fallback = Snapshot::default();
    fallback.meta.generation = 1;
    assert_eq!(cache.hydrate(Some(fallback)).await, SnapshotOrigin::Durable);
    assert_eq!(cache.current().meta.generation, 41);
    assert_eq!(cache.get_snapshot().state, CacheState::Warm);
}
