//! Event names used when streaming job progress to clients.
//!
//! Shared by the SSE and WebSocket transports in the API crate.

/// Progress snapshot while the job is pending or processing.
pub const MSG_TYPE_JOB_PROGRESS: &str = "job_progress";

/// Final snapshot of a job that completed.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job_completed";

/// Final snapshot of a job that failed.
pub const MSG_TYPE_JOB_FAILED: &str = "job_failed";

/// Message type for a snapshot with the given status.
pub fn message_type(status: crate::job::JobStatus) -> &'static str {
    use crate::job::JobStatus;
    match status {
        JobStatus::Completed => MSG_TYPE_JOB_COMPLETED,
        JobStatus::Failed | JobStatus::Cancelled => MSG_TYPE_JOB_FAILED,
        JobStatus::Pending | JobStatus::Processing => MSG_TYPE_JOB_PROGRESS,
    }
}
