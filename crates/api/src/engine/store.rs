//! In-memory keyed collection of jobs.
//!
//! Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
//! shared between the runners, the query handlers and the retention sweep.
//! No lock is held across an await point outside this module, so a runner
//! waiting on the pipeline never blocks readers or other jobs.

use std::collections::HashMap;

use bookmeta_core::job::{Job, JobError, ProgressSnapshot};
use bookmeta_core::step_result::StepResult;
use bookmeta_core::types::{JobId, Timestamp};
use chrono::Utc;
use indexmap::IndexMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a pending job.
    ///
    /// Fails with [`JobError::EmptyInput`] when no identifier remains after
    /// deduplication; nothing is stored in that case.
    pub async fn create(
        &self,
        items: &[String],
        chunk_size: usize,
        site_id: &str,
    ) -> Result<Job, JobError> {
        let job = Job::new(items, chunk_size, site_id, Utc::now())?;
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    /// Clone of the job record.
    pub async fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Run `f` against the job while holding the read lock.
    ///
    /// No transition can happen while `f` runs.
    pub async fn with_job<R>(&self, job_id: &str, f: impl FnOnce(&Job) -> R) -> Option<R> {
        self.jobs.read().await.get(job_id).map(f)
    }

    /// `pending -> processing`.
    pub async fn start(&self, job_id: &str) -> Result<ProgressSnapshot, JobError> {
        self.update(job_id, |job, _| job.start()).await
    }

    /// Merge one chunk's results into the job.
    pub async fn merge_chunk(
        &self,
        job_id: &str,
        chunk_index: usize,
        results: IndexMap<String, StepResult>,
    ) -> Result<ProgressSnapshot, JobError> {
        self.update(job_id, |job, _| job.merge_chunk(chunk_index, results))
            .await
    }

    /// `processing -> completed`.
    pub async fn complete(&self, job_id: &str) -> Result<ProgressSnapshot, JobError> {
        self.update(job_id, |job, now| job.complete(now)).await
    }

    /// `processing -> failed`.
    pub async fn fail(&self, job_id: &str, message: &str) -> Result<ProgressSnapshot, JobError> {
        self.update(job_id, |job, now| job.fail(message, now)).await
    }

    /// Remove every job that finished more than `retention` ago.
    ///
    /// Returns the ids of the removed jobs.
    pub async fn evict_expired(&self, retention: chrono::Duration) -> Vec<JobId> {
        self.evict_expired_at(Utc::now(), retention).await
    }

    /// [`evict_expired`](Self::evict_expired) with an explicit clock.
    pub async fn evict_expired_at(&self, now: Timestamp, retention: chrono::Duration) -> Vec<JobId> {
        let mut jobs = self.jobs.write().await;
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|job| job.is_expired(now, retention))
            .map(|job| job.id.clone())
            .collect();
        for id in &expired {
            jobs.remove(id);
        }
        expired
    }

    /// Number of stored jobs, finished or not.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Number of jobs not yet in a terminal status.
    pub async fn active_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| !job.status.is_terminal())
            .count()
    }

    /// Apply a transition under the write lock and snapshot the result.
    async fn update(
        &self,
        job_id: &str,
        f: impl FnOnce(&mut Job, Timestamp) -> Result<(), JobError>,
    ) -> Result<ProgressSnapshot, JobError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        let now = Utc::now();
        f(job, now)?;
        Ok(job.snapshot(now))
    }
}
