//! Aggregator: merge per-adapter outcomes into one run result.
//!
//! Router order is preserved, record order within an adapter is preserved,
//! and nothing is deduplicated here: the same gig listed on two marketplaces
//! is two market signals.

use serde::Serialize;

use crate::acquire::AdapterRun;
use crate::error::AdapterError;
use crate::listing::Listing;
use crate::taxonomy::TaxonomyKey;

/// Per-adapter accounting line.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdapterReport {
    pub source: String,
    pub succeeded: bool,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub raw_count: usize,
    pub kept: usize,
    pub dropped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AdapterError>,
}

/// Outcome of one acquisition run. Ephemeral; only `listings` is persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub taxonomy: TaxonomyKey,
    pub query: String,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Raw records discarded by the validity gate, across all adapters.
    pub dropped: usize,
    pub adapters: Vec<AdapterReport>,
    #[serde(skip)]
    pub listings: Vec<Listing>,
}

impl RunResult {
    pub fn is_partial(&self) -> bool {
        self.failed > 0 && self.successful > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &AdapterError> {
        self.adapters.iter().filter_map(|a| a.error.as_ref())
    }
}

pub fn aggregate(taxonomy: TaxonomyKey, query: &str, runs: Vec<AdapterRun>) -> RunResult {
    let mut result = RunResult {
        taxonomy,
        query: query.to_string(),
        total: runs.len(),
        successful: 0,
        failed: 0,
        dropped: 0,
        adapters: Vec::with_capacity(runs.len()),
        listings: Vec::new(),
    };

    for run in runs {
        match run.outcome {
            Ok(output) => {
                let raw_count = output.raw.len();
                let before = result.listings.len();
                result
                    .listings
                    .extend(output.listings.into_iter().filter(Listing::is_valid));
                let kept = result.listings.len() - before;
                let dropped = raw_count.saturating_sub(kept);

                result.successful += 1;
                result.dropped += dropped;
                result.adapters.push(AdapterReport {
                    source: run.source,
                    succeeded: true,
                    attempts: run.attempts,
                    elapsed_ms: run.elapsed_ms,
                    raw_count,
                    kept,
                    dropped,
                    error: None,
                });
            }
            Err(err) => {
                result.failed += 1;
                result.adapters.push(AdapterReport {
                    source: run.source,
                    succeeded: false,
                    attempts: run.attempts,
                    elapsed_ms: run.elapsed_ms,
                    raw_count: 0,
                    kept: 0,
                    dropped: 0,
                    error: Some(err),
                });
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::AdapterOutput;
    use crate::listing::RawListing;
    use crate::taxonomy::{BusinessKind, OfferingKind};
    use chrono::Utc;

    fn listing(source: &str, title: &str, price: f64) -> Listing {
        Listing {
            source: source.into(),
            title: title.into(),
            price,
            currency: "USD".into(),
            rating: None,
            reviews: 0,
            delivery_days: None,
            seller_name: None,
            seller_level: None,
            description: None,
            category: "logo".into(),
            url: Some("https://example.test/same".into()),
            scraped_at: Utc::now(),
        }
    }

    fn ok_run(source: &str, raw: usize, listings: Vec<Listing>) -> AdapterRun {
        AdapterRun {
            source: source.into(),
            attempts: 1,
            elapsed_ms: 5,
            outcome: Ok(AdapterOutput {
                raw: vec![RawListing::new(source, "x"); raw],
                listings,
            }),
        }
    }

    fn key() -> TaxonomyKey {
        TaxonomyKey::new(BusinessKind::Digital, OfferingKind::Service)
    }

    #[test]
    fn preserves_adapter_order_and_duplicates() {
        let runs = vec![
            ok_run("fiverr", 2, vec![listing("fiverr", "A", 5.0), listing("fiverr", "B", 6.0)]),
            AdapterRun {
                source: "upwork".into(),
                attempts: 2,
                elapsed_ms: 10,
                outcome: Err(AdapterError::fetch("upwork", "reset")),
            },
            ok_run("freelancer", 1, vec![listing("freelancer", "A", 5.0)]),
        ];
        let r = aggregate(key(), "logo", runs);
        assert_eq!((r.total, r.successful, r.failed), (3, 2, 1));
        let titles: Vec<_> = r.listings.iter().map(|l| (l.source.as_str(), l.title.as_str())).collect();
        assert_eq!(titles, vec![("fiverr", "A"), ("fiverr", "B"), ("freelancer", "A")]);
        assert_eq!(r.adapters[1].error.as_ref().unwrap().adapter, "upwork");
        assert!(r.is_partial());
        assert_eq!(r.failures().count(), 1);
    }

    #[test]
    fn invalid_records_never_pass_through() {
        let runs = vec![ok_run(
            "fiverr",
            3,
            vec![listing("fiverr", "A", 5.0), listing("fiverr", "", 5.0), listing("fiverr", "C", 0.0)],
        )];
        let r = aggregate(key(), "logo", runs);
        assert_eq!(r.listings.len(), 1);
        assert_eq!(r.dropped, 2);
        assert_eq!(r.adapters[0].kept, 1);
    }
}
