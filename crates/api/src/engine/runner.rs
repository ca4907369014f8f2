//! Asynchronous driver for one chunked job.
//!
//! Walks the job's chunks in order, runs each identifier through the
//! pipeline step one at a time, merges each chunk's results into the store
//! and notifies progress observers after every chunk.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bookmeta_core::job::{JobError, ProgressSnapshot};
use bookmeta_core::step_result::{PipelineStage, StepResult};
use bookmeta_core::types::JobId;
use bookmeta_events::ProgressBroadcaster;
use bookmeta_pipeline::PipelineStep;
use futures::FutureExt;
use indexmap::IndexMap;

use super::store::JobStore;

/// Drives jobs from `pending` to a terminal status.
///
/// Cheap to clone; one clone is moved into each spawned job task.
#[derive(Clone)]
pub struct JobRunner {
    store: Arc<JobStore>,
    broadcaster: ProgressBroadcaster,
    step: Arc<dyn PipelineStep>,
    chunk_delay: Duration,
}

impl JobRunner {
    pub fn new(
        store: Arc<JobStore>,
        broadcaster: ProgressBroadcaster,
        step: Arc<dyn PipelineStep>,
        chunk_delay: Duration,
    ) -> Self {
        Self {
            store,
            broadcaster,
            step,
            chunk_delay,
        }
    }

    /// Run the job to completion.
    ///
    /// Bookkeeping errors fail the job; per-identifier failures never do.
    pub async fn run(self, job_id: JobId) {
        let started = std::time::Instant::now();
        match self.drive(&job_id).await {
            Ok(()) => {
                tracing::info!(
                    job_id = %job_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job completed",
                );
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job failed");
                match self.store.fail(&job_id, &e.to_string()).await {
                    Ok(snapshot) => self.publish(&snapshot),
                    Err(fail_err) => tracing::error!(
                        job_id = %job_id,
                        error = %fail_err,
                        "Failed to mark job as failed",
                    ),
                }
            }
        }
    }

    async fn drive(&self, job_id: &str) -> Result<(), JobError> {
        let snapshot = self.store.start(job_id).await?;
        self.publish(&snapshot);

        let (chunks, site_id) = self
            .store
            .with_job(job_id, |job| (job.chunks.clone(), job.site_id.clone()))
            .await
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        let total_chunks = chunks.len();
        tracing::info!(job_id, total_chunks, site = %site_id, "Job started");

        for (index, chunk) in chunks.into_iter().enumerate() {
            tracing::debug!(job_id, chunk = index + 1, total_chunks, size = chunk.len(), "Processing chunk");

            let mut results = IndexMap::with_capacity(chunk.len());
            for isbn in chunk {
                let result = self.process_isbn(&isbn, &site_id).await;
                results.insert(isbn, result);
            }

            let snapshot = self.store.merge_chunk(job_id, index, results).await?;
            self.publish(&snapshot);

            if index + 1 < total_chunks && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
        }

        let snapshot = self.store.complete(job_id).await?;
        self.publish(&snapshot);
        Ok(())
    }

    /// Run one identifier, turning a panic into an `internal` failure.
    async fn process_isbn(&self, isbn: &str, site_id: &str) -> StepResult {
        match AssertUnwindSafe(self.step.process_one(isbn, site_id))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(isbn, error = %message, "Pipeline step panicked");
                StepResult::failed(
                    isbn,
                    PipelineStage::Internal,
                    format!("Pipeline step panicked: {message}"),
                )
            }
        }
    }

    fn publish(&self, snapshot: &ProgressSnapshot) {
        let delivered = self.broadcaster.notify(snapshot);
        tracing::debug!(
            job_id = %snapshot.job_id,
            status = %snapshot.status,
            processed = snapshot.processed,
            delivered,
            "Progress published",
        );
    }
}
