//! Runs one ingestion cycle with the configured providers, publishes it
//! (persisting when a snapshot path is set) and prints the snapshot JSON.
//!
//! `--sample` swaps every live provider for the bundled sample posts.

use std::sync::Arc;

use anyhow::{Context, Result};
use sentiment_pulse::ingest::config::load_config_default;
use sentiment_pulse::ingest::providers::SampleProvider;
use sentiment_pulse::ingest::scheduler::refresh_once;
use sentiment_pulse::ingest::types::SourceProvider;
use sentiment_pulse::{init_tracing, Runtime};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing()?;

    let config = load_config_default()?;
    let sample_only = std::env::args().skip(1).any(|a| a == "--sample");

    let runtime = if sample_only {
        let providers: Vec<Arc<dyn SourceProvider>> = vec![Arc::new(SampleProvider::bundled())];
        Runtime::with_providers(config, providers)
    } else {
        Runtime::from_config(config)
    };

    runtime.cache.hydrate(None).await;
    let outcome = refresh_once(&runtime.pipeline, &runtime.cache, &runtime.config.subjects).await;
    tracing::info!(?outcome, "ingest_once finished");

    let snapshot = runtime.cache.current();
    let json = serde_json::to_string_pretty(&*snapshot).context("serializing snapshot")?;
    println!("{json}");
    Ok(())
}
