// src/store/memory.rs
use std::sync::RwLock;

use async_trait::async_trait;

use super::{ListingQuery, RecordStore};
use crate::error::StoreError;
use crate::listing::Listing;

/// In-process append-only store. Backs local runs and tests; contents are
/// lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<Listing>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Listing>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Listing> {
        self.rows.read().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, listing: &Listing) -> Result<(), StoreError> {
        self.insert_many(std::slice::from_ref(listing)).await
    }

    async fn insert_many(&self, listings: &[Listing]) -> Result<(), StoreError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        rows.extend_from_slice(listings);
        Ok(())
    }

    async fn query(&self, query: &ListingQuery) -> Result<Vec<Listing>, StoreError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        let mut out: Vec<Listing> = rows.iter().filter(|l| query.matches(l)).cloned().collect();
        // stable sort keeps insertion order among equal timestamps
        out.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at));
        out.truncate(query.limit);
        Ok(out)
    }
}
