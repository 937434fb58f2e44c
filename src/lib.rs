// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod error;
pub mod taxonomy;
pub mod routing;
pub mod listing;
pub mod normalize;
pub mod sources;
pub mod acquire;
pub mod aggregate;
pub mod store;
pub mod cache;
pub mod jobs;
pub mod scheduler;
pub mod config;
pub mod metrics;
pub mod api;

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::task::JoinHandle;
use tracing::info;

pub use crate::api::{create_router, AppState};
pub use crate::error::{Error, Result};

use crate::acquire::Coordinator;
use crate::cache::CacheManager;
use crate::config::{AppConfig, SourcesFile, StoreConfig};
use crate::jobs::JobQueue;
use crate::normalize::Normalizer;
use crate::routing::SourceRouter;
use crate::scheduler::{default_targets, spawn_refresh_scheduler};
use crate::sources::AdapterRegistry;
use crate::store::{DynStore, MemoryStore, PostgrestStore};

/// Default `EnvFilter` directive when `RUST_LOG` is unset. Events use short
/// per-component targets, so each one is listed next to the crate path.
pub const DEFAULT_LOG_FILTER: &str =
    "market_scraper=info,acquire=info,api=info,cache=info,jobs=info,scheduler=info,sources=info,store=info,warn";

/// Running service pieces. Background tasks stop when the runtime does.
pub struct App {
    pub router: Router,
    pub state: AppState,
    pub worker: JoinHandle<()>,
    pub scheduler: Option<JoinHandle<()>>,
}

pub fn build_store(cfg: &StoreConfig) -> anyhow::Result<DynStore> {
    Ok(match cfg {
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
        StoreConfig::Postgrest(pg) => {
            Arc::new(PostgrestStore::new(pg.clone()).context("building postgrest store")?)
        }
    })
}

/// Wire the cache manager and job worker around an already built coordinator.
/// Must be called inside a tokio runtime.
pub fn build_state(
    coordinator: Coordinator,
    store: DynStore,
    config: &AppConfig,
) -> (AppState, JoinHandle<()>) {
    let cache = Arc::new(CacheManager::new(
        Arc::new(coordinator),
        store,
        config.cache.clone(),
    ));
    let (jobs, worker) = JobQueue::spawn(cache.clone(), config.queue_capacity);
    let state = AppState {
        cache,
        jobs,
        environment: config.environment.clone(),
    };
    (state, worker)
}

/// Build the whole service from configuration. Routing overrides and adapter
/// declarations come from `sources`; unmapped pairs or broken adapter specs
/// fail here.
pub fn build_app(config: &AppConfig, sources: SourcesFile) -> anyhow::Result<App> {
    let router = SourceRouter::with_overrides(&sources.routing).context("building source router")?;
    let registry = AdapterRegistry::from_specs(&sources.adapters)?;

    for id in router.all_sources() {
        if registry.get(id).is_none() {
            tracing::warn!(source = id, "routed source has no adapter; it will report as unavailable");
        }
    }

    let coordinator = Coordinator::new(
        router,
        registry,
        Normalizer::new(config.normalizer.clone()),
        config.coordinator.clone(),
    );
    let store = build_store(&config.store)?;
    let (state, worker) = build_state(coordinator, store, config);

    let scheduler = config.refresh_interval.map(|every| {
        let targets = if sources.refresh.is_empty() {
            default_targets()
        } else {
            sources.refresh.clone()
        };
        info!(targets = targets.len(), interval_secs = every.as_secs(), "refresh scheduler enabled");
        spawn_refresh_scheduler(state.jobs.clone(), targets, every)
    });

    info!(
        store = config.store.backend(),
        adapters = state.cache.coordinator().registry().len(),
        "market scraper ready"
    );

    Ok(App {
        router: create_router(state.clone()),
        state,
        worker,
        scheduler,
    })
}
