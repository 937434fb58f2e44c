// src/acquire.rs
//! Acquisition coordinator.
//!
//! Resolves the adapters for a taxonomy pair, runs them concurrently under a
//! shared in-flight bound, gives every attempt its own timeout, normalizes each
//! adapter's output as soon as it arrives and hands everything to the
//! aggregator. An adapter failure (error, timeout, missing adapter) is recorded
//! in the run result; it never aborts sibling adapters and never escapes
//! `acquire`.
//!
//! There is no outer deadline on a run. Callers that need one wrap the call in
//! their own `tokio::time::timeout`.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::aggregate::{aggregate, RunResult};
use crate::error::{AdapterError, Error, Result};
use crate::listing::{Listing, RawListing};
use crate::normalize::Normalizer;
use crate::routing::SourceRouter;
use crate::sources::{AdapterRegistry, ExtractRequest, SourceAdapter};
use crate::taxonomy::TaxonomyKey;

pub const DEFAULT_ADAPTER_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;
pub const DEFAULT_PER_ADAPTER_LIMIT: usize = 20;
pub const DEFAULT_REGION: &str = "global";

/// Whole-invocation retry for one adapter. Every attempt gets the full
/// per-adapter timeout; backoff doubles from `initial_backoff` up to `max_backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// One attempt, no retry.
    pub const fn single() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
        }
    }

    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, initial: Duration) -> Self {
        self.initial_backoff = initial;
        self
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single()
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub adapter_timeout: Duration,
    /// Adapter invocations allowed in flight at once, across all runs.
    pub max_in_flight: usize,
    /// Raw records kept per adapter per run.
    pub per_adapter_limit: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            adapter_timeout: DEFAULT_ADAPTER_TIMEOUT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            per_adapter_limit: DEFAULT_PER_ADAPTER_LIMIT,
        }
    }
}

/// Raw and normalized output of one successful adapter invocation.
#[derive(Debug, Clone, Default)]
pub struct AdapterOutput {
    pub raw: Vec<RawListing>,
    pub listings: Vec<Listing>,
}

/// One adapter's part of a run.
#[derive(Debug, Clone)]
pub struct AdapterRun {
    pub source: String,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub outcome: std::result::Result<AdapterOutput, AdapterError>,
}

/// Hands out `scraped_at` stamps that never go backwards within one run,
/// even if the wall clock does.
#[derive(Debug, Default)]
struct RunClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl RunClock {
    fn stamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let mut last = match self.last.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        let ts = match *last {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        *last = Some(ts);
        ts
    }
}

pub struct Coordinator {
    router: SourceRouter,
    registry: AdapterRegistry,
    normalizer: Normalizer,
    config: CoordinatorConfig,
    permits: Arc<Semaphore>,
}

impl Coordinator {
    pub fn new(
        router: SourceRouter,
        registry: AdapterRegistry,
        normalizer: Normalizer,
        config: CoordinatorConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        Self {
            router,
            registry,
            normalizer,
            config,
            permits,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn router(&self) -> &SourceRouter {
        &self.router
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Single attempt per adapter, default region.
    pub async fn acquire(&self, key: TaxonomyKey, query: &str) -> Result<RunResult> {
        self.acquire_with(key, query, DEFAULT_REGION, &RetryPolicy::single())
            .await
    }

    /// Run every routed adapter for `query`. Only routing and an empty query
    /// produce an `Err`; adapter problems end up in the returned result.
    pub async fn acquire_with(
        &self,
        key: TaxonomyKey,
        query: &str,
        region: &str,
        retry: &RetryPolicy,
    ) -> Result<RunResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::validation("query must not be empty"));
        }
        let sources = self.router.route(key)?;

        let request = ExtractRequest {
            query: query.to_string(),
            region: region.trim().to_string(),
            timeout: self.config.adapter_timeout,
            limit: self.config.per_adapter_limit,
        };
        let clock = RunClock::default();
        let started = Instant::now();

        info!(
            target: "acquire",
            taxonomy = %key,
            query,
            adapters = sources.len(),
            "acquisition run started"
        );

        let runs = join_all(
            sources
                .iter()
                .map(|id| self.invoke(id, &request, retry, &clock)),
        )
        .await;

        let result = aggregate(key, query, runs);

        counter!("acquire_runs_total").increment(1);
        if result.failed > 0 {
            counter!("acquire_runs_degraded_total").increment(1);
        }
        info!(
            target: "acquire",
            taxonomy = %key,
            query,
            successful = result.successful,
            failed = result.failed,
            listings = result.listings.len(),
            dropped = result.dropped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "acquisition run finished"
        );
        Ok(result)
    }

    async fn invoke(
        &self,
        id: &str,
        request: &ExtractRequest,
        retry: &RetryPolicy,
        clock: &RunClock,
    ) -> AdapterRun {
        let started = Instant::now();

        let Some(adapter) = self.registry.get(id) else {
            let err = AdapterError::unavailable(id, "no adapter registered for this source");
            record_failure(&err, 0);
            return AdapterRun {
                source: id.to_string(),
                attempts: 0,
                elapsed_ms: 0,
                outcome: Err(err),
            };
        };

        let max_attempts = retry.max_attempts.max(1);
        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            match self.attempt(adapter.as_ref(), id, request).await {
                Ok(raw) => break Ok(raw),
                Err(err) if attempts < max_attempts && err.is_retryable() => {
                    let delay = retry.backoff_for(attempts);
                    warn!(
                        target: "acquire",
                        source = id,
                        attempt = attempts,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "adapter attempt failed, retrying"
                    );
                    counter!("acquire_adapter_retries_total", "source" => id.to_string())
                        .increment(1);
                    tokio::time::sleep(delay).await;
                }
                Err(err) => break Err(err),
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        histogram!("acquire_adapter_ms", "source" => id.to_string()).record(elapsed_ms as f64);

        let outcome = match outcome {
            Ok(raw) => Ok(self.normalize_output(id, raw, &request.query, clock)),
            Err(err) => {
                record_failure(&err, attempts);
                Err(err)
            }
        };

        AdapterRun {
            source: id.to_string(),
            attempts,
            elapsed_ms,
            outcome,
        }
    }

    /// One bounded attempt: wait for an in-flight slot, then race the adapter
    /// against the per-adapter timeout. Expiry drops (cancels) only this call.
    async fn attempt(
        &self,
        adapter: &dyn SourceAdapter,
        id: &str,
        request: &ExtractRequest,
    ) -> std::result::Result<Vec<RawListing>, AdapterError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AdapterError::unavailable(id, "coordinator is shutting down"))?;

        match tokio::time::timeout(self.config.adapter_timeout, adapter.extract(request)).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::timeout(id, self.config.adapter_timeout)),
        }
    }

    fn normalize_output(
        &self,
        id: &str,
        mut raw: Vec<RawListing>,
        query: &str,
        clock: &RunClock,
    ) -> AdapterOutput {
        raw.truncate(self.config.per_adapter_limit);
        for r in raw.iter_mut() {
            if r.source.trim().is_empty() {
                r.source = id.to_string();
            }
        }

        let scraped_at = clock.stamp();
        let listings: Vec<Listing> = raw
            .iter()
            .filter_map(|r| self.normalizer.normalize(r, query, scraped_at))
            .collect();

        let dropped = raw.len() - listings.len();
        if dropped > 0 {
            counter!("normalize_dropped_total", "source" => id.to_string()).increment(dropped as u64);
        }
        debug!(
            target: "acquire",
            source = id,
            raw = raw.len(),
            kept = listings.len(),
            dropped,
            "adapter output normalized"
        );

        AdapterOutput { raw, listings }
    }
}

fn record_failure(err: &AdapterError, attempts: u32) {
    warn!(
        target: "acquire",
        source = %err.adapter,
        kind = %err.kind,
        attempts,
        error = %err.message,
        "adapter failed"
    );
    counter!(
        "acquire_adapter_failures_total",
        "source" => err.adapter.clone(),
        "kind" => err.kind.as_str()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy::single()
            .with_attempts(5)
            .with_backoff(Duration::from_secs(1));
        assert_eq!(p.backoff_for(1), Duration::from_secs(1));
        assert_eq!(p.backoff_for(2), Duration::from_secs(2));
        assert_eq!(p.backoff_for(3), Duration::from_secs(4));
        assert_eq!(p.backoff_for(5), Duration::from_secs(10));
        assert_eq!(p.backoff_for(40), Duration::from_secs(10));
    }

    #[test]
    fn with_attempts_never_goes_below_one() {
        assert_eq!(RetryPolicy::single().with_attempts(0).max_attempts, 1);
    }

    #[test]
    fn run_clock_is_monotonic() {
        let clock = RunClock::default();
        let a = clock.stamp();
        let b = clock.stamp();
        assert!(b >= a);
    }

    #[tokio::test]
    async fn empty_query_is_rejected_before_routing() {
        let c = Coordinator::new(
            SourceRouter::default(),
            AdapterRegistry::new(),
            Normalizer::default(),
            CoordinatorConfig::default(),
        );
        let key = TaxonomyKey::new(
            crate::taxonomy::BusinessKind::Digital,
            crate::taxonomy::OfferingKind::Service,
        );
        assert!(matches!(c.acquire(key, "   ").await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn unregistered_sources_count_as_failures() {
        let c = Coordinator::new(
            SourceRouter::default(),
            AdapterRegistry::new(),
            Normalizer::default(),
            CoordinatorConfig::default(),
        );
        let key = TaxonomyKey::new(
            crate::taxonomy::BusinessKind::Physical,
            crate::taxonomy::OfferingKind::Product,
        );
        let r = c.acquire(key, "office chair").await.unwrap();
        assert_eq!((r.total, r.successful, r.failed), (3, 0, 3));
        assert!(r.listings.is_empty());
    }
}
