// src/scheduler.rs
use std::time::Duration;

use metrics::{counter, gauge};
use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::cache::{AcquisitionRequest, DEFAULT_MAX_AGE_HOURS};
use crate::jobs::JobQueue;
use crate::taxonomy::{BusinessKind, OfferingKind, TaxonomyKey};

/// One category kept warm by the periodic refresh.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshTarget {
    pub business_type: BusinessKind,
    pub offering_type: OfferingKind,
    pub query: String,
}

impl RefreshTarget {
    pub fn new(business: BusinessKind, offering: OfferingKind, query: &str) -> Self {
        Self {
            business_type: business,
            offering_type: offering,
            query: query.to_string(),
        }
    }

    pub fn to_request(&self) -> AcquisitionRequest {
        AcquisitionRequest::new(
            TaxonomyKey::new(self.business_type, self.offering_type),
            self.query.clone(),
        )
        .with_max_age_hours(DEFAULT_MAX_AGE_HOURS)
    }
}

/// Common categories refreshed when the sources file names none.
pub fn default_targets() -> Vec<RefreshTarget> {
    use BusinessKind::*;
    use OfferingKind::*;
    vec![
        RefreshTarget::new(Digital, Service, "web development"),
        RefreshTarget::new(Digital, Service, "graphic design"),
        RefreshTarget::new(Digital, Product, "saas tools"),
        RefreshTarget::new(Physical, Product, "electronics"),
    ]
}

/// Enqueue every target once per `interval`. The first tick fires
/// immediately. Jobs go through the queue so refreshes never run ahead of
/// the worker.
pub fn spawn_refresh_scheduler(
    queue: JobQueue,
    targets: Vec<RefreshTarget>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let mut queued = 0usize;
            for t in &targets {
                match queue.submit(t.to_request()) {
                    Ok(()) => queued += 1,
                    Err(e) => tracing::warn!(
                        target: "scheduler",
                        query = %t.query,
                        error = %e,
                        "refresh not queued"
                    ),
                }
            }

            counter!("refresh_ticks_total").increment(1);
            gauge!("refresh_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
            tracing::info!(
                target: "scheduler",
                queued,
                targets = targets.len(),
                "refresh tick"
            );
        }
    })
}
