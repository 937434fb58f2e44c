// src/store/postgrest.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::debug;

use super::{ListingQuery, RecordStore};
use crate::error::StoreError;
use crate::listing::Listing;

pub const DEFAULT_TABLE: &str = "market_listings";

#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    pub base_url: String,
    pub api_key: String,
    pub table: String,
    pub timeout: Duration,
}

impl PostgrestConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            table: DEFAULT_TABLE.to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.base_url.trim_end_matches('/'),
            self.table
        )
    }
}

/// Listing table behind a PostgREST endpoint (Supabase and friends).
pub struct PostgrestStore {
    cfg: PostgrestConfig,
    http: Client,
}

impl PostgrestStore {
    pub fn new(cfg: PostgrestConfig) -> Result<Self, StoreError> {
        if cfg.base_url.trim().is_empty() || cfg.api_key.trim().is_empty() {
            return Err(StoreError::Unavailable(
                "postgrest store needs a base URL and an API key".into(),
            ));
        }
        let http = Client::builder()
            .user_agent("market-scraper/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(cfg.timeout)
            .build()?;
        Ok(Self { cfg, http })
    }

    pub fn config(&self) -> &PostgrestConfig {
        &self.cfg
    }
}

/// Query-string pairs for a read. `*` is PostgREST's `ilike` wildcard.
pub fn query_params(query: &ListingQuery) -> Vec<(String, String)> {
    let needle: String = query
        .category_like
        .trim()
        .chars()
        .filter(|c| !matches!(c, '*' | '%' | ',' | '(' | ')'))
        .collect();

    let mut params = vec![("select".to_string(), "*".to_string())];
    if !needle.is_empty() {
        params.push(("category".into(), format!("ilike.*{needle}*")));
    }
    if let Some(min) = query.min_scraped_at {
        params.push(("scraped_at".into(), format!("gte.{}", min.to_rfc3339())));
    }
    params.push(("order".into(), "scraped_at.desc".into()));
    params.push(("limit".into(), query.limit.to_string()));
    params
}

async fn check(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RecordStore for PostgrestStore {
    fn backend(&self) -> &'static str {
        "postgrest"
    }

    async fn insert(&self, listing: &Listing) -> Result<(), StoreError> {
        self.insert_many(std::slice::from_ref(listing)).await
    }

    async fn insert_many(&self, listings: &[Listing]) -> Result<(), StoreError> {
        if listings.is_empty() {
            return Ok(());
        }
        let resp = self
            .http
            .post(self.cfg.table_url())
            .header("apikey", &self.cfg.api_key)
            .bearer_auth(&self.cfg.api_key)
            .header("Prefer", "return=minimal")
            .json(listings)
            .send()
            .await?;
        check(resp).await?;
        debug!(target: "store", rows = listings.len(), table = %self.cfg.table, "inserted listings");
        Ok(())
    }

    async fn query(&self, query: &ListingQuery) -> Result<Vec<Listing>, StoreError> {
        let resp = self
            .http
            .get(self.cfg.table_url())
            .header("apikey", &self.cfg.api_key)
            .bearer_auth(&self.cfg.api_key)
            .query(&query_params(query))
            .send()
            .await?;
        let body = check(resp).await?.text().await?;
        let rows: Vec<Listing> = serde_json::from_str(&body)?;
        Ok(rows)
    }
}
