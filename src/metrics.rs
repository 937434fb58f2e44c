use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe();
        Ok(Self { handle })
    }

    /// Wrap an existing handle (e.g. from a recorder built but not installed).
    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    describe_counter!("acquire_runs_total", "Acquisition runs started");
    describe_counter!(
        "acquire_runs_degraded_total",
        "Acquisition runs with at least one failed adapter"
    );
    describe_counter!(
        "acquire_adapter_failures_total",
        "Adapter invocations that failed, by source and kind"
    );
    describe_counter!("acquire_adapter_retries_total", "Adapter attempts retried after a transient failure");
    describe_histogram!("acquire_adapter_ms", Unit::Milliseconds, "Adapter invocation wall time");
    describe_counter!("normalize_dropped_total", "Raw records rejected by the price/title gate");
    describe_counter!("cache_hits_total", "Requests served from the record store");
    describe_counter!("cache_misses_total", "Requests that triggered a fresh acquisition");
    describe_counter!("cache_dedup_skipped_total", "Acquired records not written because they already existed");
    describe_counter!("store_rows_written_total", "Listings appended to the record store");
    describe_counter!("jobs_submitted_total", "Background acquisitions accepted");
    describe_counter!("jobs_rejected_total", "Background acquisitions refused, by reason");
    describe_counter!("jobs_completed_total", "Background acquisitions finished");
    describe_counter!("jobs_failed_total", "Background acquisitions that returned an error");
    describe_gauge!("jobs_queue_depth", "Jobs waiting behind the one being processed");
    describe_counter!("refresh_ticks_total", "Scheduled refresh ticks");
    describe_gauge!("refresh_last_run_ts", Unit::Seconds, "Unix time of the last refresh tick");
}
