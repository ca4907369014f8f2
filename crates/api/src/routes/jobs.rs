//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST   /                -> submit_job
/// POST   /csv             -> submit_csv_job
/// GET    /{id}            -> get_job_status
/// GET    /{id}/results    -> get_job_results
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(jobs::submit_job))
        .route("/csv", post(jobs::submit_csv_job))
        .route("/{id}", get(jobs::get_job_status))
        .route("/{id}/results", get(jobs::get_job_results))
}
