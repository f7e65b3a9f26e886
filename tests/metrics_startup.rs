// tests/metrics_startup.rs
#![cfg(feature = "strict-metrics")]
mod common;

use std::time::Duration;

use common::{as_providers, labeled, test_config, ScriptedProvider};
use sentiment_pulse::Runtime;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use tower::ServiceExt;

#[tokio::test]
async fn first_cycle_after_startup_is_counted() {
    // One recorder per test binary; this file has a single test on purpose.
    let p = ScriptedProvider::new("scripted")
        .with("AAPL", Ok(vec![labeled("AAPL", "1", "bullish", 4)]))
        .into_arc();
    let rt = Runtime::with_providers(test_config(&["AAPL"]), as_providers(&[p]));
    let app = rt.start_service();

    let signal = rt.cache.refresh_signal();
    tokio::time::timeout(Duration::from_secs(5), async {
        while signal.cycles_completed() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("initial cycle");

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("ingest_cycles_total 1"), "{text}");
    assert!(text.contains("snapshot_publish_total 1"), "{text}");
}
