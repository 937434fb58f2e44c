// src/sources/mod.rs
//! Source adapters: one pluggable extractor per marketplace.
//!
//! The rest of the crate only ever sees [`SourceAdapter`]; marketplace-specific
//! page structure lives entirely inside the adapter (for `html` adapters, in
//! the selector table loaded from the sources config).

pub mod fixture;
pub mod html;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::AdapterError;
use crate::listing::RawListing;

pub use fixture::FixtureAdapter;
pub use html::{HtmlAdapter, HtmlAdapterSpec, SelectorSpec};

/// What an adapter is asked to extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    pub query: String,
    pub region: String,
    /// Budget the coordinator will enforce; adapters may use it for their own I/O.
    pub timeout: Duration,
    /// Maximum number of raw records the caller will keep.
    pub limit: usize,
}

#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Marketplace identifier, matched case-insensitively against routing tables.
    fn name(&self) -> &str;

    /// Extract raw listings for one query, in page order.
    async fn extract(&self, request: &ExtractRequest) -> Result<Vec<RawListing>, AdapterError>;
}

pub type DynAdapter = Arc<dyn SourceAdapter>;

/// Adapter declaration from the sources config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AdapterSpec {
    Html(HtmlAdapterSpec),
    Fixture { name: String, path: PathBuf },
}

impl AdapterSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Html(spec) => &spec.name,
            Self::Fixture { name, .. } => name,
        }
    }
}

/// Identifier → adapter lookup used by the coordinator.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, DynAdapter>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the adapter's lowercase name, replacing any previous entry.
    pub fn register(&mut self, adapter: DynAdapter) -> &mut Self {
        let key = adapter.name().trim().to_ascii_lowercase();
        self.adapters.insert(key, adapter);
        self
    }

    pub fn with(mut self, adapter: DynAdapter) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, id: &str) -> Option<DynAdapter> {
        self.adapters.get(&id.trim().to_ascii_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut v: Vec<String> = self.adapters.keys().cloned().collect();
        v.sort();
        v
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Build every declared adapter. Selector or fixture problems fail here,
    /// at startup, rather than on the first request.
    pub fn from_specs(specs: &[AdapterSpec]) -> Result<Self> {
        let mut reg = Self::new();
        for spec in specs {
            let adapter: DynAdapter = match spec {
                AdapterSpec::Html(html) => Arc::new(
                    HtmlAdapter::new(html.clone())
                        .with_context(|| format!("building html adapter '{}'", html.name))?,
                ),
                AdapterSpec::Fixture { name, path } => Arc::new(
                    FixtureAdapter::from_path(name, path)
                        .with_context(|| format!("building fixture adapter '{name}'"))?,
                ),
            };
            reg.register(adapter);
        }
        Ok(reg)
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}
