//! Bounded background queue for image persistence.
//!
//! Reads that trigger a refresh must not wait on image uploads, so their
//! enrichment pass only enqueues jobs here. A single worker drains the
//! channel; a full queue drops the job and counts it rather than growing.
//! The receiver outlives any one worker task, so the engine can stop the
//! worker and spawn a fresh one on the same channel.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use super::enrich::{ImageJob, ImageOutcome, ImagePersister};
use super::stats::{EngineStats, bump};

/// Producer half, cheap to clone.
#[derive(Clone)]
pub struct ImageQueue {
    tx: mpsc::Sender<ImageJob>,
    stats: Arc<EngineStats>,
}

/// Consumer half. Spawning it again after the previous task was aborted
/// resumes draining the same queue.
#[derive(Clone)]
pub struct ImageWorker {
    rx: Arc<Mutex<mpsc::Receiver<ImageJob>>>,
}

impl ImageQueue {
    pub fn bounded(capacity: usize, stats: Arc<EngineStats>) -> (Self, ImageWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, stats }, ImageWorker { rx: Arc::new(Mutex::new(rx)) })
    }

    /// Queue a job without waiting. Returns false if it was dropped.
    pub fn enqueue(&self, job: ImageJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => {
                bump(&self.stats.images_queued);
                true
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                bump(&self.stats.images_dropped);
                tracing::warn!(key = %job.key, "image queue full, dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                bump(&self.stats.images_dropped);
                tracing::warn!(key = %job.key, "image worker stopped, dropping job");
                false
            }
        }
    }
}

impl ImageWorker {
    /// Start draining the queue. Jobs run one at a time; a second task
    /// spawned while one is alive waits for the receiver.
    pub fn spawn(&self, persister: Arc<ImagePersister>) -> JoinHandle<()> {
        let rx = self.rx.clone();
        tokio::spawn(async move {
            let mut rx = rx.lock().await;
            while let Some(job) = rx.recv().await {
                match persister.persist(&job).await {
                    Ok(ImageOutcome::Persisted) => {
                        tracing::debug!(key = %job.key, "background image persisted");
                    }
                    Ok(outcome) => {
                        tracing::trace!(key = %job.key, ?outcome, "background image job done");
                    }
                    Err(e) => {
                        bump(&persister.stats().images_failed);
                        tracing::warn!(key = %job.key, error = %e, "background image persistence failed");
                    }
                }
            }
            tracing::debug!("image worker exiting");
        })
    }
}
