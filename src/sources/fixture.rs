// src/sources/fixture.rs
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{ExtractRequest, SourceAdapter};
use crate::error::AdapterError;
use crate::listing::RawListing;

/// Serves a fixed set of raw records (from a JSON array). Used for local runs
/// without network access and as a deterministic stand-in in tests.
pub struct FixtureAdapter {
    name: String,
    records: Vec<RawListing>,
}

impl FixtureAdapter {
    pub fn new(name: impl Into<String>, records: Vec<RawListing>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }

    pub fn from_json_str(name: impl Into<String>, s: &str) -> Result<Self> {
        let records: Vec<RawListing> = serde_json::from_str(s).context("parsing fixture listings")?;
        Ok(Self::new(name, records))
    }

    pub fn from_path(name: impl Into<String>, path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading fixture from {}", path.display()))?;
        Self::from_json_str(name, &content)
    }
}

#[async_trait]
impl SourceAdapter for FixtureAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, request: &ExtractRequest) -> Result<Vec<RawListing>, AdapterError> {
        Ok(self
            .records
            .iter()
            .take(request.limit)
            .cloned()
            .map(|mut r| {
                if r.source.trim().is_empty() {
                    r.source = self.name.clone();
                }
                r
            })
            .collect())
    }
}
