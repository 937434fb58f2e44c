//! Source router: taxonomy key → ordered marketplace identifiers.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::taxonomy::{BusinessKind, OfferingKind, TaxonomyKey};

/// Fixed lookup table. Every taxonomy pair maps to a non-empty, ordered list;
/// construction fails otherwise, so `route` never sees an unmapped pair in practice.
#[derive(Debug, Clone)]
pub struct SourceRouter {
    table: BTreeMap<TaxonomyKey, Vec<String>>,
}

impl SourceRouter {
    pub fn new(table: BTreeMap<TaxonomyKey, Vec<String>>) -> Result<Self> {
        let mut clean = BTreeMap::new();
        for key in TaxonomyKey::all() {
            let sources: Vec<String> = table
                .get(&key)
                .map(|v| {
                    v.iter()
                        .map(|s| s.trim().to_ascii_lowercase())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            if sources.is_empty() {
                return Err(Error::configuration(format!(
                    "no sources mapped for taxonomy pair {key}"
                )));
            }
            clean.insert(key, sources);
        }
        Ok(Self { table: clean })
    }

    /// Built-in table, overridden per pair by `overrides` (keys like `digital_service`).
    pub fn with_overrides(overrides: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut table = default_table();
        for (raw_key, sources) in overrides {
            let key = TaxonomyKey::from_config_key(raw_key)?;
            table.insert(key, sources.clone());
        }
        Self::new(table)
    }

    pub fn route(&self, key: TaxonomyKey) -> Result<&[String]> {
        self.table
            .get(&key)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::configuration(format!("taxonomy pair {key} is not routed")))
    }

    /// Every identifier referenced by the table, deduplicated.
    pub fn all_sources(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.table.values().flatten().map(String::as_str).collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

impl Default for SourceRouter {
    fn default() -> Self {
        Self {
            table: default_table(),
        }
    }
}

fn default_table() -> BTreeMap<TaxonomyKey, Vec<String>> {
    use BusinessKind::*;
    use OfferingKind::*;

    let rows: [(TaxonomyKey, [&str; 3]); 4] = [
        (TaxonomyKey::new(Digital, Service), ["fiverr", "upwork", "freelancer"]),
        (TaxonomyKey::new(Digital, Product), ["etsy", "appsumo", "producthunt"]),
        (TaxonomyKey::new(Physical, Product), ["indiamart", "ebay", "amazon"]),
        (TaxonomyKey::new(Physical, Service), ["indiamart", "justdial", "urbanclap"]),
    ];
    rows.into_iter()
        .map(|(k, v)| (k, v.iter().map(|s| s.to_string()).collect()))
        .collect()
}
