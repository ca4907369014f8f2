//! Owned entry point to the job engine.
//!
//! [`JobManager`] holds the job store and the progress broadcaster, spawns a
//! [`JobRunner`] task per submitted job and answers status, results and
//! subscription queries.

use std::sync::Arc;
use std::time::Duration;

use bookmeta_core::job::{Job, JobError, JobStatus, JobSummary, ProgressSnapshot};
use bookmeta_core::step_result::StepResult;
use bookmeta_core::types::{JobId, Timestamp};
use bookmeta_events::{ProgressBroadcaster, Subscription};
use bookmeta_pipeline::PipelineStep;
use chrono::Utc;
use indexmap::IndexMap;
use serde::Serialize;

use super::runner::JobRunner;
use super::store::JobStore;

/// Engine tuning.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Pause between two chunks of the same job.
    pub chunk_delay: Duration,
    /// How long finished jobs are kept before eviction.
    pub retention: chrono::Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            chunk_delay: Duration::from_secs(1),
            retention: chrono::Duration::hours(24),
        }
    }
}

/// Returned by [`JobManager::submit`].
#[derive(Debug, Clone, Serialize)]
pub struct JobCreated {
    pub job_id: JobId,
    pub total_items: usize,
    pub total_chunks: usize,
}

/// Status query answer: the progress snapshot plus timing, and the full
/// results once the job has completed.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    #[serde(flatten)]
    pub snapshot: ProgressSnapshot,
    pub site_id: String,
    pub start_time: Timestamp,
    pub end_time: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<IndexMap<String, StepResult>>,
}

impl JobStatusView {
    fn from_job(job: &Job, now: Timestamp) -> Self {
        Self {
            snapshot: job.snapshot(now),
            site_id: job.site_id.clone(),
            start_time: job.start_time,
            end_time: job.end_time,
            results: (job.status == JobStatus::Completed).then(|| job.results.clone()),
        }
    }
}

/// Results query answer; partial while the job is still processing.
#[derive(Debug, Clone, Serialize)]
pub struct JobResultsView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub results: IndexMap<String, StepResult>,
    pub summary: JobSummary,
}

/// The chunked job engine.
pub struct JobManager {
    store: Arc<JobStore>,
    broadcaster: ProgressBroadcaster,
    runner: JobRunner,
    settings: EngineSettings,
}

impl JobManager {
    pub fn new(step: Arc<dyn PipelineStep>, settings: EngineSettings) -> Self {
        let store = Arc::new(JobStore::new());
        let broadcaster = ProgressBroadcaster::new();
        let runner = JobRunner::new(
            Arc::clone(&store),
            broadcaster.clone(),
            step,
            settings.chunk_delay,
        );
        Self {
            store,
            broadcaster,
            runner,
            settings,
        }
    }

    /// Create a job and start processing it in the background.
    ///
    /// Returns as soon as the job is stored; the caller never waits for
    /// processing.
    pub async fn submit(
        &self,
        items: &[String],
        chunk_size: usize,
        site_id: &str,
    ) -> Result<JobCreated, JobError> {
        let job = self.store.create(items, chunk_size, site_id).await?;
        let created = JobCreated {
            job_id: job.id.clone(),
            total_items: job.items.len(),
            total_chunks: job.total_chunks(),
        };
        tracing::info!(
            job_id = %created.job_id,
            total_items = created.total_items,
            total_chunks = created.total_chunks,
            site = site_id,
            "Job submitted",
        );

        tokio::spawn(self.runner.clone().run(job.id));
        Ok(created)
    }

    pub async fn status(&self, job_id: &str) -> Result<JobStatusView, JobError> {
        let now = Utc::now();
        self.store
            .with_job(job_id, |job| JobStatusView::from_job(job, now))
            .await
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    pub async fn results(&self, job_id: &str) -> Result<JobResultsView, JobError> {
        self.store
            .with_job(job_id, |job| JobResultsView {
                job_id: job.id.clone(),
                status: job.status,
                results: job.results.clone(),
                summary: job.summary.clone(),
            })
            .await
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Subscribe to a job's progress.
    ///
    /// The subscription yields the current snapshot first and ends once the
    /// job is terminal. Registration happens under the store's read lock so
    /// no chunk can be merged between the initial snapshot and the
    /// registration.
    pub async fn subscribe(&self, job_id: &str) -> Result<Subscription, JobError> {
        let now = Utc::now();
        self.store
            .with_job(job_id, |job| self.broadcaster.subscribe(job.snapshot(now)))
            .await
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Evict jobs finished longer ago than the retention window, along with
    /// any observer still registered for them. Returns the number evicted.
    pub async fn evict_expired(&self) -> usize {
        self.evict_expired_at(Utc::now()).await
    }

    pub async fn evict_expired_at(&self, now: Timestamp) -> usize {
        let evicted = self
            .store
            .evict_expired_at(now, self.settings.retention)
            .await;
        for job_id in &evicted {
            let observers = self.broadcaster.drop_job(job_id);
            tracing::debug!(job_id = %job_id, observers, "Evicted job");
        }
        evicted.len()
    }

    /// Jobs still pending or processing.
    pub async fn active_jobs(&self) -> usize {
        self.store.active_count().await
    }

    /// Jobs currently held in memory.
    pub async fn job_count(&self) -> usize {
        self.store.len().await
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }
}
