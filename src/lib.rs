// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod analyze;
pub mod api;
pub mod error;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod sentiment;
pub mod snapshot;

use std::sync::Arc;

use anyhow::Result;

use crate::history::HistoryTracker;
use crate::ingest::config::IngestConfig;
use crate::ingest::providers::build_providers;
use crate::ingest::types::SourceProvider;
use crate::ingest::IngestPipeline;
use crate::snapshot::store::{FileSnapshotStore, SnapshotStore};
use crate::snapshot::{bundled_fallback, SnapshotCache, SnapshotOrigin};

pub use crate::api::create_router;

/// Everything a running service needs, built from one config.
pub struct Runtime {
    pub config: IngestConfig,
    pub pipeline: Arc<IngestPipeline>,
    pub cache: Arc<SnapshotCache>,
}

impl Runtime {
    /// Build with the providers the config enables.
    pub fn from_config(config: IngestConfig) -> Self {
        let providers = build_providers(&config);
        Self::with_providers(config, providers)
    }

    pub fn with_providers(config: IngestConfig, providers: Vec<Arc<dyn SourceProvider>>) -> Self {
        let store: Option<Arc<dyn SnapshotStore>> = config
            .snapshot_path()
            .map(|p| Arc::new(FileSnapshotStore::new(p)) as Arc<dyn SnapshotStore>);
        let history = HistoryTracker::new(config.history.clone(), config.refresh_interval());
        let cache = Arc::new(
            SnapshotCache::new(history, config.snapshot_ttl(), store)
                .with_refresh_cooldown(config.stale_refresh_cooldown()),
        );
        let pipeline = Arc::new(IngestPipeline::new(&config, providers));
        Self {
            config,
            pipeline,
            cache,
        }
    }

    /// Durable snapshot if one is valid, else the bundled sample dataset.
    pub async fn hydrate(&self) -> SnapshotOrigin {
        let history = HistoryTracker::new(self.config.history.clone(), self.config.refresh_interval());
        let fallback = bundled_fallback(
            &self.config.subjects,
            self.pipeline.scorer(),
            self.pipeline.tiers(),
            &history,
        );
        self.cache.hydrate(Some(fallback)).await
    }

    pub fn spawn_scheduler(&self) -> tokio::task::JoinHandle<()> {
        ingest::scheduler::RefreshScheduler::new(
            self.pipeline.clone(),
            self.cache.clone(),
            self.config.subjects.clone(),
            self.config.refresh_interval(),
        )
        .spawn()
    }

    /// Install metrics, start the refresh loop and build the full router.
    /// The recorder goes in first so the immediate first cycle is counted.
    pub fn start_service(&self) -> shuttle_axum::axum::Router {
        let metrics = match crate::metrics::Metrics::init(self.config.snapshot_ttl_secs) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(error = %e, "metrics disabled");
                None
            }
        };
        self.spawn_scheduler();

        let router = create_router(self.app_state());
        match metrics {
            Some(m) => router.merge(m.router()),
            None => router,
        }
    }

    pub fn app_state(&self) -> api::AppState {
        api::AppState {
            cache: self.cache.clone(),
            force_timeout: self.config.force_refresh_timeout(),
        }
    }
}

/// Tracing setup shared by the binaries. `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sentiment_pulse=info,ingest=info,snapshot=info,scheduler=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer().compact()).try_init()?;
    }
    Ok(())
}
