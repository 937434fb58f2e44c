// src/jobs.rs
//! Fire-and-return acquisition queue.
//!
//! `submit` only reports whether the job was accepted. There is no result
//! channel back to the submitter; completed work shows up in the record store.

use std::sync::Arc;

use metrics::{counter, gauge};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::{AcquisitionRequest, CacheManager};
use crate::error::QueueError;

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Cloneable submit handle. The worker stops once every handle is dropped
/// and the backlog is drained.
#[derive(Clone, Debug)]
pub struct JobQueue {
    tx: mpsc::Sender<AcquisitionRequest>,
}

impl JobQueue {
    /// Start the single worker task. Each job runs an unconditional refresh.
    pub fn spawn(manager: Arc<CacheManager>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<AcquisitionRequest>(capacity.max(1));

        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                gauge!("jobs_queue_depth").set(rx.len() as f64);
                match manager.refresh(&job).await {
                    Ok(outcome) => {
                        counter!("jobs_completed_total").increment(1);
                        info!(
                            target: "jobs",
                            taxonomy = %job.key,
                            query = %job.query,
                            listings = outcome.listings.len(),
                            persisted = outcome.persisted,
                            "background acquisition finished"
                        );
                    }
                    Err(e) => {
                        counter!("jobs_failed_total").increment(1);
                        warn!(
                            target: "jobs",
                            taxonomy = %job.key,
                            query = %job.query,
                            error = %e,
                            "background acquisition failed"
                        );
                    }
                }
            }
            info!(target: "jobs", "job queue closed, worker exiting");
        });

        (Self { tx }, worker)
    }

    pub fn submit(&self, job: AcquisitionRequest) -> Result<(), QueueError> {
        match self.tx.try_send(job) {
            Ok(()) => {
                counter!("jobs_submitted_total").increment(1);
                Ok(())
            }
            Err(TrySendError::Full(job)) => {
                counter!("jobs_rejected_total", "reason" => "full").increment(1);
                warn!(target: "jobs", query = %job.query, "job queue full, rejecting");
                Err(QueueError::Full)
            }
            Err(TrySendError::Closed(_)) => {
                counter!("jobs_rejected_total", "reason" => "closed").increment(1);
                Err(QueueError::Closed)
            }
        }
    }

    /// Free slots left in the queue.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}
