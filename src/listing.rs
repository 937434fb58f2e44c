//! Listing records: the untrusted adapter output and the canonical persisted form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unvalidated field values produced by one adapter for one query.
/// Everything except `source` and `title` is optional and untrusted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    pub source: String,
    pub title: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub reviews: Option<String>,
    #[serde(default)]
    pub delivery: Option<String>,
    #[serde(default)]
    pub seller_name: Option<String>,
    #[serde(default)]
    pub seller_level: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl RawListing {
    pub fn new(source: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_price(mut self, v: impl Into<String>) -> Self {
        self.price = Some(v.into());
        self
    }

    pub fn with_rating(mut self, v: impl Into<String>) -> Self {
        self.rating = Some(v.into());
        self
    }

    pub fn with_reviews(mut self, v: impl Into<String>) -> Self {
        self.reviews = Some(v.into());
        self
    }

    pub fn with_delivery(mut self, v: impl Into<String>) -> Self {
        self.delivery = Some(v.into());
        self
    }

    pub fn with_url(mut self, v: impl Into<String>) -> Self {
        self.url = Some(v.into());
        self
    }

    pub fn with_description(mut self, v: impl Into<String>) -> Self {
        self.description = Some(v.into());
        self
    }
}

/// Canonical, normalized listing. Built by the normalizer, immutable afterwards,
/// appended to the record store and never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub source: String,
    pub title: String,
    pub price: f64,
    pub currency: String,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub reviews: u64,
    #[serde(default)]
    pub delivery_days: Option<u32>,
    #[serde(default)]
    pub seller_name: Option<String>,
    #[serde(default)]
    pub seller_level: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    #[serde(default)]
    pub url: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

impl Listing {
    /// Record-level gate: positive finite price and a non-empty title.
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0 && !self.title.trim().is_empty()
    }

    /// Stable fingerprint of the listing: source + url, or source + title when
    /// the listing has no url. Used for optional write-time deduplication.
    pub fn listing_key(&self) -> String {
        use sha2::{Digest, Sha256};
        use std::fmt::Write as _;

        let mut hasher = Sha256::new();
        hasher.update(self.source.trim().to_ascii_lowercase().as_bytes());
        hasher.update(b"\n");
        match self.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => hasher.update(url.as_bytes()),
            None => hasher.update(self.title.trim().to_lowercase().as_bytes()),
        }
        let digest = hasher.finalize();
        let mut out = String::with_capacity(32);
        for b in digest.iter().take(16) {
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }

    /// Render back into raw field strings, e.g. to re-run normalization.
    pub fn to_raw(&self) -> RawListing {
        RawListing {
            source: self.source.clone(),
            title: self.title.clone(),
            price: Some(self.price.to_string()),
            currency: Some(self.currency.clone()),
            rating: self.rating.map(|r| r.to_string()),
            reviews: Some(self.reviews.to_string()),
            delivery: self.delivery_days.map(|d| format!("{d} days")),
            seller_name: self.seller_name.clone(),
            seller_level: self.seller_level.clone(),
            description: self.description.clone(),
            url: self.url.clone(),
            category: Some(self.category.clone()),
        }
    }
}
