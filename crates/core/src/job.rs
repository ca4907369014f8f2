//! Chunked metadata job: record, state transitions and progress snapshots.
//!
//! A [`Job`] is created once from an identifier list, then driven by a single
//! runner through `pending -> processing -> completed | failed`. All
//! transitions are methods on the record so the rules can be tested without
//! any runtime.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::chunking::{dedupe_preserving_order, split_into_chunks};
use crate::step_result::StepResult;
use crate::types::{JobId, Timestamp};

/// Prefix of every generated job id.
const JOB_ID_PREFIX: &str = "job_";

/// Errors raised by job bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("No valid identifiers were provided")]
    EmptyInput,

    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Chunk {got} merged out of order (expected chunk {expected})")]
    ChunkOutOfOrder { expected: usize, got: usize },

    #[error("Result for {0} was already recorded")]
    DuplicateResult(String),
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// Reserved; no component moves a job into this state.
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Running counters over a job's (or a batch's) results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub total: usize,
    pub processed: usize,
    /// Same as `scrape_successful`; kept for existing clients.
    pub successful: usize,
    pub scrape_successful: usize,
    pub ai_successful: usize,
    pub csv_successful: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl JobSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Count one more processed result.
    pub fn record(&mut self, result: &StepResult) {
        self.processed += 1;
        if result.scrape_success {
            self.scrape_successful += 1;
        }
        if result.ai_success {
            self.ai_successful += 1;
        }
        if result.csv_success {
            self.csv_successful += 1;
        }
        if result.csv_duplicate {
            self.duplicates += 1;
        }
        if result.is_failure() {
            self.failed += 1;
        }
        self.successful = self.scrape_successful;
    }

    /// Build a summary from a finished set of results.
    pub fn from_results<'a>(total: usize, results: impl IntoIterator<Item = &'a StepResult>) -> Self {
        let mut summary = Self::new(total);
        for result in results {
            summary.record(result);
        }
        summary
    }

    /// `round(100 * processed / total)`, 0 for an empty job.
    pub fn percent_complete(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.processed as f64 / self.total as f64) * 100.0).round() as u32
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A chunked metadata job.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Retailer every identifier of the job is scraped from.
    pub site_id: String,
    pub items: Vec<String>,
    pub chunks: Vec<Vec<String>>,
    /// Number of chunks fully merged so far.
    pub current_chunk: usize,
    pub results: IndexMap<String, StepResult>,
    pub summary: JobSummary,
    pub start_time: Timestamp,
    pub end_time: Option<Timestamp>,
    pub error: Option<String>,
}

impl Job {
    /// Create a pending job from raw identifiers.
    ///
    /// Duplicates are removed (first occurrence wins) before chunking.
    pub fn new(
        items: &[String],
        chunk_size: usize,
        site_id: impl Into<String>,
        now: Timestamp,
    ) -> Result<Self, JobError> {
        let items = dedupe_preserving_order(items);
        if items.is_empty() {
            return Err(JobError::EmptyInput);
        }
        let chunks = split_into_chunks(&items, chunk_size);

        Ok(Self {
            id: generate_job_id(),
            status: JobStatus::Pending,
            site_id: site_id.into(),
            summary: JobSummary::new(items.len()),
            items,
            chunks,
            current_chunk: 0,
            results: IndexMap::new(),
            start_time: now,
            end_time: None,
            error: None,
        })
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// `pending -> processing`.
    pub fn start(&mut self) -> Result<(), JobError> {
        self.transition(JobStatus::Pending, JobStatus::Processing)
    }

    /// Merge the results of chunk `chunk_index` and advance `current_chunk`.
    ///
    /// Chunks must be merged in order, each identifier at most once.
    pub fn merge_chunk(
        &mut self,
        chunk_index: usize,
        chunk_results: IndexMap<String, StepResult>,
    ) -> Result<(), JobError> {
        if self.status != JobStatus::Processing {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to: JobStatus::Processing,
            });
        }
        if chunk_index != self.current_chunk || chunk_index >= self.chunks.len() {
            return Err(JobError::ChunkOutOfOrder {
                expected: self.current_chunk,
                got: chunk_index,
            });
        }
        if let Some(dup) = chunk_results.keys().find(|k| self.results.contains_key(*k)) {
            return Err(JobError::DuplicateResult(dup.clone()));
        }

        for (isbn, result) in chunk_results {
            self.summary.record(&result);
            self.results.insert(isbn, result);
        }
        self.current_chunk += 1;
        Ok(())
    }

    /// `processing -> completed`.
    pub fn complete(&mut self, now: Timestamp) -> Result<(), JobError> {
        self.transition(JobStatus::Processing, JobStatus::Completed)?;
        self.end_time = Some(now);
        Ok(())
    }

    /// `processing -> failed`.
    pub fn fail(&mut self, message: impl Into<String>, now: Timestamp) -> Result<(), JobError> {
        self.transition(JobStatus::Processing, JobStatus::Failed)?;
        self.error = Some(message.into());
        self.end_time = Some(now);
        Ok(())
    }

    /// Whether the job finished more than `retention` before `now`.
    ///
    /// Jobs without an end time are never expired, whatever their age.
    pub fn is_expired(&self, now: Timestamp, retention: chrono::Duration) -> bool {
        match self.end_time {
            Some(end) => now - end > retention,
            None => false,
        }
    }

    /// Estimated milliseconds until the job finishes.
    ///
    /// Average time per processed item times the items left; `None` before
    /// the first item has been processed.
    pub fn eta_ms(&self, now: Timestamp) -> Option<u64> {
        let processed = self.summary.processed;
        if processed == 0 {
            return None;
        }
        let elapsed_ms = (now - self.start_time).num_milliseconds().max(0) as f64;
        let remaining = self.summary.total.saturating_sub(processed) as f64;
        Some((elapsed_ms / processed as f64 * remaining).round() as u64)
    }

    /// Point-in-time progress view of the job.
    pub fn snapshot(&self, now: Timestamp) -> ProgressSnapshot {
        ProgressSnapshot {
            job_id: self.id.clone(),
            status: self.status,
            current_chunk: self.current_chunk,
            total_chunks: self.total_chunks(),
            total_items: self.summary.total,
            processed: self.summary.processed,
            progress: self.summary.percent_complete(),
            eta_ms: self.eta_ms(now),
            summary: self.summary.clone(),
            error: self.error.clone(),
        }
    }

    fn transition(&mut self, from: JobStatus, to: JobStatus) -> Result<(), JobError> {
        if self.status != from {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Generate a fresh opaque job id.
pub fn generate_job_id() -> JobId {
    format!("{JOB_ID_PREFIX}{}", uuid::Uuid::new_v4().simple())
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time summary of a job's progress, pushed to observers and
/// returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub current_chunk: usize,
    pub total_chunks: usize,
    pub total_items: usize,
    pub processed: usize,
    /// Percentage complete, `round(100 * processed / total)`.
    pub progress: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_ms: Option<u64>,
    pub summary: JobSummary,
    pub error: Option<String>,
}

impl ProgressSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
