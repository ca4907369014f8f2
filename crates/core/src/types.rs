/// Opaque job identifier, e.g. `job_3f2a...`.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
