//! Market Scraper: binary entrypoint.
//! Boots the Axum HTTP server: configuration, store, adapters, job worker,
//! optional refresh scheduler and the `/metrics` route.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_scraper::config::{load_sources_default, AppConfig};
use market_scraper::metrics::Metrics;

/// JSON logs when `LOG_FORMAT=json`, compact otherwise. Uses `try_init` so a
/// subscriber installed by the runtime is left alone.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(market_scraper::DEFAULT_LOG_FILTER));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env()?;
    let sources = load_sources_default()?;
    let app = market_scraper::build_app(&config, sources)?;

    let router = match Metrics::init() {
        Ok(m) => app.router.merge(m.router()),
        Err(e) => {
            tracing::warn!(error = %e, "metrics disabled");
            app.router
        }
    };

    Ok(router.into())
}
