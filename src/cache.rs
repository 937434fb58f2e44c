// src/cache.rs
//! Freshness-gated cache manager.
//!
//! Per request: look for enough recent records in the store (`SERVE_CACHED`),
//! otherwise run the coordinator, persist what it returns and hand back the
//! fresh set (`ACQUIRE_FRESH`). The store has no TTL; staleness is decided
//! only here.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::{info, warn};

use crate::acquire::{Coordinator, RetryPolicy, DEFAULT_REGION};
use crate::aggregate::RunResult;
use crate::error::{Error, Result};
use crate::listing::Listing;
use crate::store::{DynStore, ListingQuery};
use crate::taxonomy::TaxonomyKey;

pub const DEFAULT_MIN_RESULT_COUNT: usize = 10;
pub const DEFAULT_RESULT_LIMIT: usize = 50;
pub const DEFAULT_MAX_AGE_HOURS: u32 = 24;
const DEDUP_LOOKUP_LIMIT: usize = 1000;

/// What to do about records that already exist when persisting a fresh run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Append everything; overlapping runs may write duplicates.
    #[default]
    None,
    /// Skip records whose source+url key is already in the freshness window
    /// or earlier in the same batch.
    SourceUrl,
}

impl FromStr for DedupPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "off" => Ok(Self::None),
            "source_url" | "source+url" | "url" => Ok(Self::SourceUrl),
            other => Err(Error::configuration(format!(
                "unknown dedup policy '{other}' (expected 'none' or 'source_url')"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub min_result_count: usize,
    pub result_limit: usize,
    pub dedup: DedupPolicy,
    /// Applied per adapter when this manager triggers an acquisition.
    pub retry: RetryPolicy,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            min_result_count: DEFAULT_MIN_RESULT_COUNT,
            result_limit: DEFAULT_RESULT_LIMIT,
            dedup: DedupPolicy::None,
            retry: RetryPolicy::single(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheDecision {
    ServeCached,
    AcquireFresh,
}

impl CacheDecision {
    pub fn is_hit(self) -> bool {
        self == Self::ServeCached
    }
}

impl fmt::Display for CacheDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ServeCached => "SERVE_CACHED",
            Self::AcquireFresh => "ACQUIRE_FRESH",
        })
    }
}

/// One validated lookup/acquisition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionRequest {
    pub key: TaxonomyKey,
    pub query: String,
    pub region: String,
    pub max_age_hours: u32,
}

impl AcquisitionRequest {
    pub fn new(key: TaxonomyKey, query: impl Into<String>) -> Self {
        Self {
            key,
            query: query.into(),
            region: DEFAULT_REGION.to_string(),
            max_age_hours: DEFAULT_MAX_AGE_HOURS,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_max_age_hours(mut self, hours: u32) -> Self {
        self.max_age_hours = hours;
        self
    }

    fn fresh_window(&self) -> ListingQuery {
        let cutoff = Utc::now() - ChronoDuration::hours(i64::from(self.max_age_hours));
        ListingQuery::category(self.query.trim()).since(cutoff)
    }
}

#[derive(Debug, Clone)]
pub struct CacheOutcome {
    pub decision: CacheDecision,
    pub listings: Vec<Listing>,
    /// Present only when the coordinator ran.
    pub run: Option<RunResult>,
    /// Records written to the store by this call.
    pub persisted: usize,
}

pub struct CacheManager {
    coordinator: Arc<Coordinator>,
    store: DynStore,
    policy: CachePolicy,
}

impl CacheManager {
    pub fn new(coordinator: Arc<Coordinator>, store: DynStore, policy: CachePolicy) -> Self {
        Self {
            coordinator,
            store,
            policy,
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Read the freshness window and decide. Store read errors propagate;
    /// nothing has been acquired yet, so nothing is lost.
    pub async fn decide(&self, req: &AcquisitionRequest) -> Result<(CacheDecision, Vec<Listing>)> {
        let limit = self.policy.result_limit.max(self.policy.min_result_count);
        let mut cached = self.store.query(&req.fresh_window().limit(limit)).await?;

        if cached.len() >= self.policy.min_result_count {
            cached.truncate(self.policy.result_limit);
            Ok((CacheDecision::ServeCached, cached))
        } else {
            Ok((CacheDecision::AcquireFresh, cached))
        }
    }

    /// Full cache-first path.
    pub async fn serve(&self, req: &AcquisitionRequest) -> Result<CacheOutcome> {
        validate(req)?;
        // unmapped pairs fail before the store is touched
        self.coordinator.router().route(req.key)?;

        let (decision, cached) = self.decide(req).await?;
        if decision.is_hit() {
            counter!("cache_hits_total").increment(1);
            info!(
                target: "cache",
                taxonomy = %req.key,
                query = %req.query,
                records = cached.len(),
                "serving cached listings"
            );
            return Ok(CacheOutcome {
                decision,
                listings: cached,
                run: None,
                persisted: 0,
            });
        }

        counter!("cache_misses_total").increment(1);
        info!(
            target: "cache",
            taxonomy = %req.key,
            query = %req.query,
            cached = cached.len(),
            needed = self.policy.min_result_count,
            "cache miss, acquiring fresh listings"
        );
        self.refresh(req).await
    }

    /// Unconditional acquisition: run the coordinator, persist, return the
    /// fresh set. A write failure is reported as `Error::Store`.
    pub async fn refresh(&self, req: &AcquisitionRequest) -> Result<CacheOutcome> {
        validate(req)?;
        let run = self
            .coordinator
            .acquire_with(req.key, &req.query, &req.region, &self.policy.retry)
            .await?;

        let to_write = self.apply_dedup(req, &run.listings).await;
        if !to_write.is_empty() {
            self.store.insert_many(&to_write).await.map_err(|e| {
                warn!(
                    target: "cache",
                    query = %req.query,
                    rows = to_write.len(),
                    error = %e,
                    "persisting acquired listings failed"
                );
                e
            })?;
            counter!("store_rows_written_total").increment(to_write.len() as u64);
        }
        let skipped = run.listings.len() - to_write.len();
        if skipped > 0 {
            counter!("cache_dedup_skipped_total").increment(skipped as u64);
        }

        Ok(CacheOutcome {
            decision: CacheDecision::AcquireFresh,
            listings: run.listings.clone(),
            persisted: to_write.len(),
            run: Some(run),
        })
    }

    async fn apply_dedup(&self, req: &AcquisitionRequest, listings: &[Listing]) -> Vec<Listing> {
        if self.policy.dedup == DedupPolicy::None {
            return listings.to_vec();
        }

        let existing = self
            .store
            .query(&req.fresh_window().limit(DEDUP_LOOKUP_LIMIT))
            .await;
        let mut seen: HashSet<String> = match existing {
            Ok(rows) => rows.iter().map(Listing::listing_key).collect(),
            Err(e) => {
                // the acquired batch is still written, only dedup is lost
                warn!(target: "cache", error = %e, "dedup lookup failed, writing batch as is");
                HashSet::new()
            }
        };

        listings
            .iter()
            .filter(|l| seen.insert(l.listing_key()))
            .cloned()
            .collect()
    }
}

fn validate(req: &AcquisitionRequest) -> Result<()> {
    if req.query.trim().is_empty() {
        return Err(Error::validation("query must not be empty"));
    }
    Ok(())
}
