//! Sentiment Pulse — Binary Entrypoint
//! Loads config, hydrates the snapshot cache, starts the refresh scheduler
//! and serves the read API (plus `/metrics`).

use shuttle_axum::ShuttleAxum;

use sentiment_pulse::ingest::config::load_config_default;
use sentiment_pulse::{init_tracing, Runtime};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    // The Shuttle runtime may already have installed a subscriber.
    if let Err(e) = init_tracing() {
        tracing::debug!(error = %e, "tracing already initialized");
    }

    let config = load_config_default()?;
    tracing::info!(
        subjects = ?config.subjects,
        interval_secs = config.refresh_interval_secs,
        snapshot_path = %config.snapshot_path,
        "ingest config loaded"
    );

    let runtime = Runtime::from_config(config);
    let origin = runtime.hydrate().await;
    tracing::info!(?origin, "snapshot cache ready");

    Ok(runtime.start_service().into())
}
