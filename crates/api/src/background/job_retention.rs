//! Periodic eviction of finished jobs.
//!
//! Spawns a background task that removes jobs whose end time is older than
//! the engine's retention window. Runs on a fixed interval using
//! `tokio::time::interval`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::JobManager;

/// Run the job retention loop until `cancel` is triggered.
///
/// `interval` must be non-zero; [`ServerConfig::validate`] rejects a zero
/// sweep interval at startup.
///
/// [`ServerConfig::validate`]: crate::config::ServerConfig::validate
pub async fn run(jobs: Arc<JobManager>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        retention_hours = jobs.settings().retention.num_hours(),
        interval_secs = interval.as_secs(),
        "Job retention task started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention task stopping");
                break;
            }
            _ = ticker.tick() => {
                let evicted = jobs.evict_expired().await;
                if evicted > 0 {
                    tracing::info!(evicted, "Job retention: evicted finished jobs");
                } else {
                    tracing::debug!("Job retention: nothing to evict");
                }
            }
        }
    }
}
