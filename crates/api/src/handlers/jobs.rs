//! Handlers for the `/jobs` resource: chunked, progress-tracked processing
//! of large ISBN sets.
//!
//! Submission returns immediately with the job id; outcome per ISBN is
//! only available by polling the status/results endpoints or by following
//! the progress stream.

use std::convert::Infallible;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use bookmeta_core::chunking::validate_chunk_size;
use bookmeta_core::isbn::clean_identifiers;
use bookmeta_core::job::ProgressSnapshot;
use bookmeta_core::sites::resolve_site_id;
use bookmeta_core::types::JobId;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;

use crate::engine::JobCreated;
use crate::error::AppResult;
use crate::handlers::upload::{read_isbn_csv, CsvFileInfo};
use crate::response::DataResponse;
use crate::state::AppState;

/// SSE event name carrying a progress snapshot.
pub const PROGRESS_EVENT: &str = "progress";

/// Request body for `POST /jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub isbns: Vec<String>,
    pub chunk_size: Option<usize>,
    pub site: Option<String>,
}

/// Query parameters for `POST /jobs/csv`.
#[derive(Debug, Default, Deserialize)]
pub struct CsvJobParams {
    pub chunk_size: Option<usize>,
    pub site: Option<String>,
}

/// Response for an accepted job.
#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: JobId,
    pub status: &'static str,
    pub total_items: usize,
    pub total_chunks: usize,
    pub site: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_file_info: Option<CsvFileInfo>,
}

impl JobAccepted {
    fn new(created: JobCreated, site: &'static str) -> Self {
        Self {
            job_id: created.job_id,
            status: "created",
            total_items: created.total_items,
            total_chunks: created.total_chunks,
            site,
            csv_file_info: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Create a chunked job from a JSON list of ISBNs. Returns 202 with the job
/// id; processing happens in the background.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJobRequest>,
) -> AppResult<impl IntoResponse> {
    let chunk_size = input.chunk_size.unwrap_or(state.config.default_chunk_size);
    validate_chunk_size(chunk_size)?;
    let site = resolve_site_id(input.site.as_deref());
    let isbns = clean_identifiers(&input.isbns);

    let created = state.jobs.submit(&isbns, chunk_size, site).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: JobAccepted::new(created, site),
        }),
    ))
}

/// POST /api/v1/jobs/csv
///
/// Create a chunked job from the ISBNs of an uploaded CSV file (multipart
/// field `csv_file`). There is no upper bound on the number of ISBNs.
pub async fn submit_csv_job(
    State(state): State<AppState>,
    Query(params): Query<CsvJobParams>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let chunk_size = params.chunk_size.unwrap_or(state.config.default_chunk_size);
    validate_chunk_size(chunk_size)?;
    let site = resolve_site_id(params.site.as_deref());

    let (import, info) = read_isbn_csv(multipart).await?;
    let created = state.jobs.submit(&import.isbns, chunk_size, site).await?;

    let mut accepted = JobAccepted::new(created, site);
    accepted.csv_file_info = Some(info);
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: accepted })))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Progress snapshot; includes the full results once the job has completed.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let status = state.jobs.status(&job_id).await?;
    Ok(Json(DataResponse { data: status }))
}

/// GET /api/v1/jobs/{id}/results
///
/// Results and summary so far, whatever the job status.
pub async fn get_job_results(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let results = state.jobs.results(&job_id).await?;
    Ok(Json(DataResponse { data: results }))
}

// ---------------------------------------------------------------------------
// Progress stream
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}/progress
///
/// Server-Sent Events: one `progress` event per snapshot, starting with the
/// current state. The stream ends after the terminal snapshot.
pub async fn stream_job_progress(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let subscription = state.jobs.subscribe(&job_id).await?;
    tracing::debug!(job_id = %job_id, subscriber_id = subscription.id(), "SSE progress stream opened");

    let events = subscription.map(|snapshot| Ok(progress_event(&snapshot)));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn progress_event(snapshot: &ProgressSnapshot) -> Event {
    match Event::default().event(PROGRESS_EVENT).json_data(snapshot) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(job_id = %snapshot.job_id, error = %e, "Failed to encode progress event");
            Event::default().event(PROGRESS_EVENT).data("{}")
        }
    }
}
