// tests/ingest_e2e.rs
//
// Full cycles through IngestPipeline + SnapshotCache with scripted providers.
mod common;

use std::time::Duration;

use common::{as_providers, labeled, raw, test_config, ScriptedProvider};
use sentiment_pulse::error::{ProviderError, ProviderErrorKind};
use sentiment_pulse::ingest::scheduler::refresh_once;
use sentiment_pulse::ingest::ProviderOutcome;
use sentiment_pulse::snapshot::{CacheState, PublishOutcome};
use sentiment_pulse::Runtime;

fn aapl_items() -> Vec<sentiment_pulse::ingest::types::RawItem> {
    let mut v = Vec::new();
    for i in 0..6 {
        v.push(labeled("AAPL", &format!("bull{i}"), "bullish", 5));
    }
    for i in 0..4 {
        v.push(labeled("AAPL", &format!("bear{i}"), "bearish", 0));
    }
    v
}

#[tokio::test]
async fn aapl_cycle_publishes_expected_summary() {
    let p = ScriptedProvider::new("scripted").with("AAPL", Ok(aapl_items())).into_arc();
    let rt = Runtime::with_providers(test_config(&["AAPL"]), as_providers(&[p.clone()]));

    assert_eq!(rt.cache.get_snapshot().state, CacheState::Empty);
    let out = refresh_once(&rt.pipeline, &rt.cache, &rt.config.subjects).await;
    assert!(matches!(out, PublishOutcome::Published { generation: 1 }));

    let view = rt.cache.get_snapshot();
    assert_eq!(view.state, CacheState::Warm);
    let s = &view.snapshot.summaries["AAPL"];
    assert_eq!(s.post_count, 10);
    assert_eq!(s.bullish_count, 6);
    assert_eq!(s.bearish_count, 4);
    assert!(s.net_score > 0.0 && s.net_score < 100.0);
    assert_eq!(view.snapshot.history["AAPL"].len(), 1);
    assert!(view.snapshot.meta.last_refreshed.is_some());
    assert_eq!(p.calls(), 1);
}

#[tokio::test]
async fn subject_with_all_providers_failing_is_left_untouched() {
    let a = ScriptedProvider::new("alpha")
        .with("AAPL", Ok(aapl_items()))
        .with("XYZ", Ok(vec![raw("XYZ", "alpha", "1", "breakout", 3)]))
        .into_arc();
    let b = ScriptedProvider::new("beta")
        .with("XYZ", Ok(vec![raw("XYZ", "beta", "2", "dump it", 1)]))
        .into_arc();
    let rt = Runtime::with_providers(
        test_config(&["AAPL", "XYZ"]),
        as_providers(&[a.clone(), b.clone()]),
    );

    refresh_once(&rt.pipeline, &rt.cache, &rt.config.subjects).await;
    let before = rt.cache.current();
    let xyz_summary = serde_json::to_vec(&before.summaries["XYZ"]).unwrap();
    let xyz_history = serde_json::to_vec(&before.history["XYZ"]).unwrap();
    let xyz_last_success = before.meta.provider_status["XYZ"].last_success;

    a.set("XYZ", Err(ProviderError::Timeout(Duration::from_secs(2))));
    b.set("XYZ", Err(ProviderError::MalformedResponse("truncated".into())));
    let out = refresh_once(&rt.pipeline, &rt.cache, &rt.config.subjects).await;
    assert!(matches!(out, PublishOutcome::Published { .. }));

    let after = rt.cache.current();
    assert_eq!(serde_json::to_vec(&after.summaries["XYZ"]).unwrap(), xyz_summary);
    assert_eq!(serde_json::to_vec(&after.history["XYZ"]).unwrap(), xyz_history);
    assert_eq!(after.meta.provider_status["XYZ"].last_success, xyz_last_success);

    // The failure is visible in meta, and AAPL still moved forward.
    let status = &after.meta.provider_status["XYZ"].providers;
    assert_eq!(
        status["alpha"],
        ProviderOutcome::Failed {
            kind: ProviderErrorKind::Timeout
        }
    );
    assert_eq!(
        status["beta"],
        ProviderOutcome::Failed {
            kind: ProviderErrorKind::MalformedResponse
        }
    );
    assert_eq!(after.history["AAPL"].len(), 2);
    assert_eq!(after.meta.provider_counts.failed, 2);
}

#[tokio::test]
async fn one_failing_provider_does_not_block_the_others() {
    let good = ScriptedProvider::new("good").with("AAPL", Ok(aapl_items())).into_arc();
    let bad = ScriptedProvider::new("bad")
        .with("AAPL", Err(ProviderError::Auth("token revoked".into())))
        .into_arc();
    let rt = Runtime::with_providers(test_config(&["AAPL"]), as_providers(&[bad, good]));

    refresh_once(&rt.pipeline, &rt.cache, &rt.config.subjects).await;
    let snap = rt.cache.current();
    assert_eq!(snap.summaries["AAPL"].post_count, 10);
    let status = &snap.meta.provider_status["AAPL"].providers;
    assert_eq!(status["good"], ProviderOutcome::Ok { items: 10 });
    assert!(!status["bad"].is_ok());
}

#[tokio::test]
async fn cycle_where_everything_fails_only_touches_meta() {
    let p = ScriptedProvider::new("only").with("AAPL", Ok(aapl_items())).into_arc();
    let rt = Runtime::with_providers(test_config(&["AAPL"]), as_providers(&[p.clone()]));
    refresh_once(&rt.pipeline, &rt.cache, &rt.config.subjects).await;
    let before = rt.cache.current();

    p.set("AAPL", Err(ProviderError::RateLimited { retry_after: None }));
    let out = refresh_once(&rt.pipeline, &rt.cache, &rt.config.subjects).await;
    assert!(matches!(out, PublishOutcome::MetaOnly { generation: 2 }));

    let after = rt.cache.current();
    assert_eq!(after.summaries, before.summaries);
    assert_eq!(after.history, before.history);
    assert_eq!(after.meta.last_refreshed, before.meta.last_refreshed);
    assert!(after.meta.last_run >= before.meta.last_run);
    assert_eq!(rt.cache.get_snapshot().state, CacheState::Warm);
}

#[tokio::test]
async fn slow_provider_times_out_without_stalling_the_cycle() {
    let slow = ScriptedProvider::new("slow")
        .with("AAPL", Ok(aapl_items()))
        .with_delay(Duration::from_secs(30))
        .into_arc();
    let fast = ScriptedProvider::new("fast")
        .with("AAPL", Ok(vec![labeled("AAPL", "f1", "bullish", 0)]))
        .into_arc();
    let mut cfg = test_config(&["AAPL"]);
    cfg.provider_timeout_secs = 1;
    let rt = Runtime::with_providers(cfg, as_providers(&[slow, fast]));

    let started = std::time::Instant::now();
    let report = rt.pipeline.run_cycle(&rt.config.subjects).await;
    assert!(started.elapsed() < Duration::from_secs(10));

    let aapl = &report.subjects[0];
    assert_eq!(
        aapl.providers["slow"],
        ProviderOutcome::Failed {
            kind: ProviderErrorKind::Timeout
        }
    );
    assert_eq!(aapl.summary.as_ref().map(|s| s.post_count), Some(1));
}

#[tokio::test]
async fn identical_raw_input_gives_identical_summaries_across_runs() {
    let p = ScriptedProvider::new("scripted").with("AAPL", Ok(aapl_items())).into_arc();
    let rt = Runtime::with_providers(test_config(&["AAPL"]), as_providers(&[p]));
    let r1 = rt.pipeline.run_cycle(&rt.config.subjects).await;
    let r2 = rt.pipeline.run_cycle(&rt.config.subjects).await;
    assert_eq!(r1.subjects[0].summary, r2.subjects[0].summary);
}
