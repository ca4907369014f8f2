pub mod ai;
pub mod books;
pub mod health;
pub mod jobs;
pub mod scrape;
pub mod sites;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /jobs                          submit (JSON)
/// /jobs/csv                      submit (CSV upload)
/// /jobs/{id}                     status snapshot
/// /jobs/{id}/results             results so far
///
/// /scrape                        scrape one ISBN
///
/// /ai/complete                   raw model completion
///
/// /books                         save a record
/// /books/export                  download the CSV store
///
/// /sites                         supported retailers
/// ```
///
/// The long-lived progress streams and the synchronous batch runs are built
/// separately by [`stream_routes`] and [`batch_routes`].
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Chunked background jobs.
        .nest("/jobs", jobs::router())
        // Synchronous scraping.
        .nest("/scrape", scrape::router())
        // Direct model access.
        .nest("/ai", ai::router())
        // CSV book store.
        .nest("/books", books::router())
        // Retailer catalogue.
        .nest("/sites", sites::router())
}

/// Job progress streams, mounted with their full paths.
///
/// ```text
/// /api/v1/jobs/{id}/progress     Server-Sent Events
/// /api/v1/jobs/{id}/ws           WebSocket
/// ```
///
/// Kept out of [`api_routes`] so the request timeout never cuts a stream.
pub fn stream_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/jobs/{id}/progress",
            get(handlers::jobs::stream_job_progress),
        )
        .route("/api/v1/jobs/{id}/ws", get(ws::job_progress_ws))
}

/// Synchronous batch runs, mounted with their full paths.
///
/// ```text
/// /api/v1/scrape/batch           scrape up to MAX_SYNC_BATCH ISBNs
/// /api/v1/workflow               full pipeline, synchronous
/// /api/v1/workflow/csv           full pipeline on a CSV upload
/// ```
///
/// A batch walks every ISBN through the retailer and the model, which can
/// take minutes. Kept out of [`api_routes`] so the request timeout never
/// drops a run halfway through its CSV writes.
pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/scrape/batch", post(handlers::scrape::scrape_batch))
        .route("/api/v1/workflow", post(handlers::workflow::run_workflow))
        .route(
            "/api/v1/workflow/csv",
            post(handlers::workflow::run_workflow_csv),
        )
}
