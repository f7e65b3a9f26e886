// tests/ingest_scheduler.rs
//
// Coalescing of forced refreshes, timeouts, and stale-read nudges against a
// live RefreshScheduler task.
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{as_providers, labeled, test_config, ScriptedProvider};
use sentiment_pulse::error::ProviderError;
use sentiment_pulse::ingest::scheduler::{RefreshOutcome, RefreshSignal};
use sentiment_pulse::snapshot::{CacheState, SnapshotOrigin};
use sentiment_pulse::Runtime;

async fn until(what: &str, mut cond: impl FnMut() -> bool) {
    let res = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(res.is_ok(), "timed out waiting for {what}");
}

fn runtime(p: &Arc<ScriptedProvider>) -> Runtime {
    Runtime::with_providers(test_config(&["AAPL"]), as_providers(&[p.clone()]))
}

fn provider() -> Arc<ScriptedProvider> {
    ScriptedProvider::new("scripted")
        .with("AAPL", Ok(vec![labeled("AAPL", "1", "bullish", 3)]))
        .into_arc()
}

#[tokio::test]
async fn two_rapid_forces_while_idle_run_one_cycle() {
    let p = provider();
    let rt = runtime(&p);
    let handle = rt.spawn_scheduler();
    let signal = rt.cache.refresh_signal();
    until("initial cycle", || signal.cycles_completed() == 1).await;

    let (a, b) = tokio::join!(
        signal.force_refresh(Duration::from_secs(5)),
        signal.force_refresh(Duration::from_secs(5)),
    );
    assert_eq!(a, RefreshOutcome::Completed);
    assert_eq!(b, RefreshOutcome::Completed);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(signal.cycles_started(), 2);
    assert_eq!(p.calls(), 2);
    assert_eq!(rt.cache.current().meta.generation, 2);
    handle.abort();
}

#[tokio::test]
async fn forces_during_a_scheduled_cycle_queue_exactly_one_more() {
    let p = provider();
    p.set_delay(Duration::from_millis(300));
    let rt = runtime(&p);
    let handle = rt.spawn_scheduler();
    let signal = rt.cache.refresh_signal();
    until("scheduled cycle running", || signal.is_running()).await;

    let (a, b, c) = tokio::join!(
        signal.force_refresh(Duration::from_secs(5)),
        signal.force_refresh(Duration::from_secs(5)),
        signal.force_refresh(Duration::from_secs(5)),
    );
    assert_eq!([a, b, c], [RefreshOutcome::Completed; 3]);

    // The queued cycle started after the scheduled one, and nothing else did.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(signal.cycles_started(), 2);
    assert_eq!(signal.cycles_completed(), 2);
    assert_eq!(p.calls(), 2);
    handle.abort();
}

#[tokio::test]
async fn force_timeout_reports_and_the_cycle_still_publishes() {
    let p = provider();
    let rt = runtime(&p);
    let handle = rt.spawn_scheduler();
    let signal = rt.cache.refresh_signal();
    until("initial cycle", || signal.cycles_completed() == 1).await;

    p.set_delay(Duration::from_millis(400));
    let out = signal.force_refresh(Duration::from_millis(50)).await;
    assert_eq!(out, RefreshOutcome::TimedOut);
    assert_eq!(rt.cache.current().meta.generation, 1);

    // Readers keep the previous snapshot meanwhile; the cycle lands later.
    assert_eq!(rt.cache.get_snapshot().state, CacheState::Warm);
    assert_eq!(signal.wait_for(1, Duration::from_secs(5)).await, RefreshOutcome::Completed);
    assert_eq!(rt.cache.current().meta.generation, 2);
    handle.abort();
}

#[tokio::test]
async fn stale_read_triggers_a_background_refresh() {
    let p = ScriptedProvider::new("scripted")
        .with("AAPL", Err(ProviderError::Transport("connection reset".into())))
        .into_arc();
    let mut cfg = test_config(&["AAPL"]);
    cfg.stale_refresh_cooldown_secs = 0;
    let rt = Runtime::with_providers(cfg, as_providers(&[p.clone()]));
    assert_eq!(rt.hydrate().await, SnapshotOrigin::Bundled);

    let handle = rt.spawn_scheduler();
    let signal = rt.cache.refresh_signal();
    until("initial cycle", || signal.cycles_completed() == 1).await;

    p.set("AAPL", Ok(vec![labeled("AAPL", "live", "bearish", 9)]));

    // Everything failed, so the bundled data is still what readers see.
    let view = rt.cache.get_snapshot();
    assert_eq!(view.state, CacheState::Stale);
    assert!(view.snapshot.summaries.contains_key("AAPL"));

    until("background cycle", || signal.cycles_completed() >= 2).await;
    let view = rt.cache.get_snapshot();
    assert_eq!(view.state, CacheState::Warm);
    assert_eq!(view.snapshot.summaries["AAPL"].bearish_count, 1);
    handle.abort();
}

fn failing_provider() -> Arc<ScriptedProvider> {
    ScriptedProvider::new("scripted")
        .with("AAPL", Err(ProviderError::Transport("connection reset".into())))
        .into_arc()
}

#[tokio::test]
async fn reads_during_an_outage_do_not_drive_the_refresh_rate() {
    let p = failing_provider();
    let rt = runtime(&p);
    assert_eq!(rt.hydrate().await, SnapshotOrigin::Bundled);
    let handle = rt.spawn_scheduler();
    let signal = rt.cache.refresh_signal();
    until("initial cycle", || signal.cycles_completed() == 1).await;

    for _ in 0..50 {
        assert_eq!(rt.cache.get_snapshot().state, CacheState::Stale);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(signal.cycles_started(), 1);
    assert_eq!(p.calls(), 1);
    handle.abort();
}

#[tokio::test]
async fn stale_reads_refresh_again_once_the_cooldown_passes() {
    let p = failing_provider();
    let mut cfg = test_config(&["AAPL"]);
    cfg.stale_refresh_cooldown_secs = 1;
    let rt = Runtime::with_providers(cfg, as_providers(&[p.clone()]));
    rt.hydrate().await;
    let handle = rt.spawn_scheduler();
    let signal = rt.cache.refresh_signal();
    until("initial cycle", || signal.cycles_completed() == 1).await;

    for _ in 0..20 {
        rt.cache.get_snapshot();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(signal.cycles_started(), 1);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    rt.cache.get_snapshot();
    until("nudged cycle", || signal.cycles_completed() == 2).await;
    for _ in 0..20 {
        rt.cache.get_snapshot();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(signal.cycles_started(), 2);
    assert_eq!(p.calls(), 2);
    handle.abort();
}

#[tokio::test]
async fn first_nudge_is_not_held_back_by_the_cooldown() {
    let signal = RefreshSignal::with_background_cooldown(Duration::from_secs(60));
    assert!(signal.request_background());
    assert!(!signal.request_background());
}

#[tokio::test]
async fn background_nudges_do_not_pile_up() {
    let signal = RefreshSignal::new();
    signal.request_background();
    signal.request_background();
    signal.request_background();
    // One pending slot: a forced request lands on the same cycle number.
    assert_eq!(signal.request(), 0);
    assert_eq!(signal.cycles_started(), 0);
    assert!(!signal.is_running());
}

#[tokio::test]
async fn wait_for_a_finished_cycle_returns_immediately() {
    let p = provider();
    let rt = runtime(&p);
    let handle = rt.spawn_scheduler();
    let signal = rt.cache.refresh_signal();
    until("initial cycle", || signal.cycles_completed() == 1).await;
    assert_eq!(
        signal.wait_for(0, Duration::from_millis(1)).await,
        RefreshOutcome::Completed
    );
    handle.abort();
}
