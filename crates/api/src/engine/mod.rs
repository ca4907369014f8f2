//! Chunked job engine.
//!
//! - [`store::JobStore`]: in-memory job records and their transitions.
//! - [`runner::JobRunner`]: drives one job through its chunks.
//! - [`manager::JobManager`]: submission, queries, subscriptions and eviction.

pub mod manager;
pub mod runner;
pub mod store;

pub use manager::{EngineSettings, JobCreated, JobManager, JobResultsView, JobStatusView};
