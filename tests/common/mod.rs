// tests/common/mod.rs
//
// Shared fakes for integration tests: scripted adapters and a store that can
// be told to fail. Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use market_scraper::acquire::{Coordinator, CoordinatorConfig};
use market_scraper::error::{AdapterError, StoreError};
use market_scraper::listing::{Listing, RawListing};
use market_scraper::normalize::Normalizer;
use market_scraper::routing::SourceRouter;
use market_scraper::sources::{AdapterRegistry, DynAdapter, ExtractRequest, SourceAdapter};
use market_scraper::store::{ListingQuery, MemoryStore, RecordStore};

/// Returns the same records every call and counts invocations.
pub struct StaticAdapter {
    pub name: String,
    pub records: Vec<RawListing>,
    pub calls: AtomicUsize,
}

impl StaticAdapter {
    pub fn new(name: &str, records: Vec<RawListing>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            records,
            calls: AtomicUsize::new(0),
        })
    }

    /// `n` valid gigs titled `"<name> gig <i>"`.
    pub fn with_gigs(name: &str, n: usize) -> Arc<Self> {
        let records = (0..n)
            .map(|i| {
                RawListing::new(name, format!("{name} gig {i}"))
                    .with_price(format!("${}", 10 + i))
                    .with_url(format!("https://{name}.test/gig/{i}"))
            })
            .collect();
        Self::new(name, records)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for StaticAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, _req: &ExtractRequest) -> Result<Vec<RawListing>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.clone())
    }
}

/// Always fails with the given error.
pub struct FailingAdapter {
    pub name: String,
    pub error: AdapterError,
    pub calls: AtomicUsize,
}

impl FailingAdapter {
    pub fn new(error: AdapterError) -> Arc<Self> {
        Arc::new(Self {
            name: error.adapter.clone(),
            error,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for FailingAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, _req: &ExtractRequest) -> Result<Vec<RawListing>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Sleeps before answering; tracks how many calls overlap.
pub struct SlowAdapter {
    pub name: String,
    pub delay: Duration,
    pub in_flight: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
}

impl SlowAdapter {
    pub fn new(name: &str, delay: Duration) -> Arc<Self> {
        Self::sharing(name, delay, Arc::default(), Arc::default())
    }

    pub fn sharing(
        name: &str,
        delay: Duration,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            delay,
            in_flight,
            peak,
        })
    }
}

#[async_trait]
impl SourceAdapter for SlowAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, _req: &ExtractRequest) -> Result<Vec<RawListing>, AdapterError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![RawListing::new(&self.name, format!("{} result", self.name)).with_price("$5")])
    }
}

/// Fails with a retryable fetch error `failures` times, then succeeds.
pub struct FlakyAdapter {
    pub name: String,
    pub failures: usize,
    pub calls: AtomicUsize,
}

impl FlakyAdapter {
    pub fn new(name: &str, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            failures,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for FlakyAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, _req: &ExtractRequest) -> Result<Vec<RawListing>, AdapterError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(AdapterError::fetch(&self.name, "connection reset"));
        }
        Ok(vec![RawListing::new(&self.name, "recovered gig").with_price("$30")])
    }
}

pub fn registry(adapters: Vec<DynAdapter>) -> AdapterRegistry {
    adapters
        .into_iter()
        .fold(AdapterRegistry::new(), |reg, a| reg.with(a))
}

pub fn coordinator(adapters: Vec<DynAdapter>, config: CoordinatorConfig) -> Coordinator {
    Coordinator::new(
        SourceRouter::default(),
        registry(adapters),
        Normalizer::default(),
        config,
    )
}

pub fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        adapter_timeout: Duration::from_secs(5),
        ..CoordinatorConfig::default()
    }
}

/// Canonical record in `category`, `age_hours` old.
pub fn stored(category: &str, title: &str, age_hours: i64) -> Listing {
    Listing {
        source: "fiverr".into(),
        title: title.into(),
        price: 25.0,
        currency: "USD".into(),
        rating: Some(4.8),
        reviews: 120,
        delivery_days: Some(3),
        seller_name: None,
        seller_level: None,
        description: None,
        category: category.into(),
        url: Some(format!("https://fiverr.test/{}", title.replace(' ', "-"))),
        scraped_at: Utc::now() - ChronoDuration::hours(age_hours),
    }
}

pub fn seeded_store(category: &str, fresh: usize, stale: usize) -> Arc<MemoryStore> {
    let mut rows: Vec<Listing> = (0..fresh)
        .map(|i| stored(category, &format!("fresh {i}"), 1))
        .collect();
    rows.extend((0..stale).map(|i| stored(category, &format!("stale {i}"), 72)));
    Arc::new(MemoryStore::with_rows(rows))
}

/// Store whose reads and/or writes fail.
pub struct BrokenStore {
    pub inner: MemoryStore,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

impl BrokenStore {
    pub fn writes_fail() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            fail_reads: false,
            fail_writes: true,
        })
    }

    pub fn reads_fail() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            fail_reads: true,
            fail_writes: false,
        })
    }
}

#[async_trait]
impl RecordStore for BrokenStore {
    fn backend(&self) -> &'static str {
        "broken"
    }

    async fn insert(&self, listing: &Listing) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Unavailable("disk on fire".into()));
        }
        self.inner.insert(listing).await
    }

    async fn query(&self, query: &ListingQuery) -> Result<Vec<Listing>, StoreError> {
        if self.fail_reads {
            return Err(StoreError::Rejected {
                status: 503,
                body: "maintenance".into(),
            });
        }
        self.inner.query(query).await
    }
}
