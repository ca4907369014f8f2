//! Tests for the chunked job engine driven by a scripted pipeline step.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use bookmeta_api::engine::{EngineSettings, JobManager};
use bookmeta_core::job::{JobError, JobStatus, ProgressSnapshot};
use bookmeta_core::step_result::{PipelineStage, StepResult};
use bookmeta_pipeline::PipelineStep;
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::Semaphore;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Succeeds for every ISBN except `FAIL...` (scrape failure) and `PANIC...`.
///
/// When `gate` is set, every call takes a permit first so tests can
/// observe the job mid-flight.
#[derive(Default)]
struct ScriptedStep {
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

#[async_trait]
impl PipelineStep for ScriptedStep {
    async fn process_one(&self, isbn: &str, _site_id: &str) -> StepResult {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if isbn.starts_with("PANIC") {
            panic!("scripted panic for {isbn}");
        }
        if isbn.starts_with("FAIL") {
            return StepResult::failed(isbn, PipelineStage::Scrape, "Failed to scrape from IBS.it: HTTP 404");
        }
        let mut result = StepResult::new(isbn);
        result.scrape_success = true;
        result.ai_success = true;
        result.csv_success = true;
        result
    }
}

fn settings() -> EngineSettings {
    EngineSettings {
        chunk_delay: Duration::ZERO,
        retention: chrono::Duration::hours(24),
    }
}

fn ids(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

async fn wait_terminal(manager: &JobManager, job_id: &str) {
    for _ in 0..500 {
        if manager.status(job_id).await.unwrap().snapshot.status.is_terminal() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} did not finish in time");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_items_in_chunks_of_two() {
    let step = Arc::new(ScriptedStep::default());
    let manager = JobManager::new(step.clone(), settings());

    let created = manager
        .submit(&ids(&["A", "B", "C"]), 2, "libraccio")
        .await
        .unwrap();
    assert_eq!(created.total_items, 3);
    assert_eq!(created.total_chunks, 2);

    wait_terminal(&manager, &created.job_id).await;

    let status = manager.status(&created.job_id).await.unwrap();
    assert_eq!(status.snapshot.status, JobStatus::Completed);
    assert_eq!(status.snapshot.current_chunk, 2);
    assert_eq!(status.snapshot.progress, 100);
    assert!(status.end_time.is_some());

    let results = status.results.unwrap();
    assert_eq!(results.keys().collect::<Vec<_>>(), ["A", "B", "C"]);
    assert_eq!(step.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn failing_items_do_not_fail_the_job() {
    let manager = JobManager::new(Arc::new(ScriptedStep::default()), settings());
    let created = manager
        .submit(&ids(&["A", "FAIL-1", "B"]), 2, "ibs")
        .await
        .unwrap();
    wait_terminal(&manager, &created.job_id).await;

    let results = manager.results(&created.job_id).await.unwrap();
    assert_eq!(results.status, JobStatus::Completed);
    assert_eq!(results.summary.processed, 3);
    assert_eq!(results.summary.failed, 1);
    assert_eq!(results.summary.csv_successful, 2);
    assert_matches!(
        &results.results["FAIL-1"].error,
        Some(f) if f.stage == PipelineStage::Scrape
    );
}

#[tokio::test]
async fn panicking_step_is_recorded_as_internal_failure() {
    let manager = JobManager::new(Arc::new(ScriptedStep::default()), settings());
    let created = manager
        .submit(&ids(&["PANIC-1", "A"]), 5, "libraccio")
        .await
        .unwrap();
    wait_terminal(&manager, &created.job_id).await;

    let results = manager.results(&created.job_id).await.unwrap();
    assert_eq!(results.status, JobStatus::Completed);
    let failure = results.results["PANIC-1"].error.clone().unwrap();
    assert_eq!(failure.stage, PipelineStage::Internal);
    assert!(failure.message.contains("scripted panic for PANIC-1"));
    assert!(results.results["A"].is_complete_success());
}

#[tokio::test]
async fn empty_input_creates_no_job() {
    let manager = JobManager::new(Arc::new(ScriptedStep::default()), settings());
    assert_matches!(
        manager.submit(&[], 10, "libraccio").await,
        Err(JobError::EmptyInput)
    );
    assert_eq!(manager.job_count().await, 0);
}

#[tokio::test]
async fn unknown_job_queries_are_not_found() {
    let manager = JobManager::new(Arc::new(ScriptedStep::default()), settings());
    assert_matches!(manager.status("job_nope").await, Err(JobError::NotFound(_)));
    assert_matches!(manager.results("job_nope").await, Err(JobError::NotFound(_)));
    assert_matches!(manager.subscribe("job_nope").await, Err(JobError::NotFound(_)));
}

#[tokio::test]
async fn subscriber_sees_monotone_progress_until_completion() {
    let gate = Arc::new(Semaphore::new(0));
    let step = Arc::new(ScriptedStep {
        calls: AtomicUsize::new(0),
        gate: Some(gate.clone()),
    });
    let manager = JobManager::new(step, settings());

    let created = manager
        .submit(&ids(&["A", "B", "C", "D", "E"]), 2, "libraccio")
        .await
        .unwrap();
    let subscription = manager.subscribe(&created.job_id).await.unwrap();

    // Release one permit per item while collecting snapshots.
    let releaser = tokio::spawn(async move {
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            gate.add_permits(1);
        }
    });

    let snapshots: Vec<ProgressSnapshot> =
        tokio::time::timeout(Duration::from_secs(5), subscription.collect())
            .await
            .expect("stream ended");
    releaser.await.unwrap();

    let first = snapshots.first().unwrap();
    assert!(!first.is_terminal());
    let last = snapshots.last().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.processed, 5);
    assert_eq!(last.current_chunk, 3);

    for pair in snapshots.windows(2) {
        assert!(pair[0].processed <= pair[1].processed);
        assert!(pair[0].current_chunk <= pair[1].current_chunk);
    }
    // Only the final snapshot is terminal.
    assert_eq!(snapshots.iter().filter(|s| s.is_terminal()).count(), 1);
}

#[tokio::test]
async fn subscribing_after_completion_yields_one_snapshot() {
    let manager = JobManager::new(Arc::new(ScriptedStep::default()), settings());
    let created = manager.submit(&ids(&["A"]), 1, "libraccio").await.unwrap();
    wait_terminal(&manager, &created.job_id).await;

    let snapshots: Vec<ProgressSnapshot> = manager
        .subscribe(&created.job_id)
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].status, JobStatus::Completed);
}

#[tokio::test]
async fn finished_jobs_are_evicted_after_retention() {
    let manager = JobManager::new(Arc::new(ScriptedStep::default()), settings());
    let created = manager.submit(&ids(&["A"]), 1, "libraccio").await.unwrap();
    wait_terminal(&manager, &created.job_id).await;

    assert_eq!(manager.evict_expired().await, 0);
    assert_eq!(
        manager
            .evict_expired_at(Utc::now() + chrono::Duration::hours(25))
            .await,
        1
    );
    assert_matches!(
        manager.status(&created.job_id).await,
        Err(JobError::NotFound(_))
    );
}

#[tokio::test]
async fn concurrent_jobs_are_independent() {
    let manager = Arc::new(JobManager::new(Arc::new(ScriptedStep::default()), settings()));
    let first = manager
        .submit(&ids(&["A", "B", "C"]), 1, "libraccio")
        .await
        .unwrap();
    let second = manager
        .submit(&ids(&["X", "FAIL-Y"]), 1, "ibs")
        .await
        .unwrap();
    assert_ne!(first.job_id, second.job_id);

    wait_terminal(&manager, &first.job_id).await;
    wait_terminal(&manager, &second.job_id).await;

    let a = manager.results(&first.job_id).await.unwrap();
    let b = manager.results(&second.job_id).await.unwrap();
    assert_eq!(a.summary.processed, 3);
    assert_eq!(a.summary.failed, 0);
    assert_eq!(b.summary.processed, 2);
    assert_eq!(b.summary.failed, 1);
    assert!(a.results.keys().all(|k| !b.results.contains_key(k)));
}
