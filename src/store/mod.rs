// src/store/mod.rs
//! Record store: append-only listing table, filterable by category and recency.
//!
//! Passed explicitly into the cache manager; there is no process-wide client.

pub mod memory;
pub mod postgrest;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::listing::Listing;

pub use memory::MemoryStore;
pub use postgrest::{PostgrestConfig, PostgrestStore};

/// Read filter: case-insensitive substring match on `category`, optional
/// lower bound on `scraped_at`, newest first, capped at `limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingQuery {
    pub category_like: String,
    pub min_scraped_at: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl ListingQuery {
    pub fn category(category_like: impl Into<String>) -> Self {
        Self {
            category_like: category_like.into(),
            min_scraped_at: None,
            limit: 50,
        }
    }

    pub fn since(mut self, min_scraped_at: DateTime<Utc>) -> Self {
        self.min_scraped_at = Some(min_scraped_at);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// In-process evaluation of the filter (ordering and limit excluded).
    pub fn matches(&self, listing: &Listing) -> bool {
        let needle = self.category_like.trim().to_lowercase();
        let category_ok = needle.is_empty() || listing.category.to_lowercase().contains(&needle);
        let fresh_ok = self
            .min_scraped_at
            .map_or(true, |min| listing.scraped_at >= min);
        category_ok && fresh_ok
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short backend name for health output and logs.
    fn backend(&self) -> &'static str;

    async fn insert(&self, listing: &Listing) -> Result<(), StoreError>;

    /// Append a batch. Backends that can do this in one round trip override it.
    async fn insert_many(&self, listings: &[Listing]) -> Result<(), StoreError> {
        for l in listings {
            self.insert(l).await?;
        }
        Ok(())
    }

    /// Matching records ordered by `scraped_at` descending, at most `query.limit`.
    async fn query(&self, query: &ListingQuery) -> Result<Vec<Listing>, StoreError>;
}

pub type DynStore = Arc<dyn RecordStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn listing(category: &str, age_hours: i64) -> Listing {
        Listing {
            source: "etsy".into(),
            title: "Mug".into(),
            price: 12.0,
            currency: "USD".into(),
            rating: None,
            reviews: 0,
            delivery_days: None,
            seller_name: None,
            seller_level: None,
            description: None,
            category: category.into(),
            url: None,
            scraped_at: Utc::now() - Duration::hours(age_hours),
        }
    }

    #[test]
    fn matches_is_case_insensitive_substring_and_fresh() {
        let q = ListingQuery::category("Logo").since(Utc::now() - Duration::hours(24));
        assert!(q.matches(&listing("minimal logo design", 1)));
        assert!(!q.matches(&listing("minimal logo design", 30)));
        assert!(!q.matches(&listing("web development", 1)));
    }
}
