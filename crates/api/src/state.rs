use std::sync::Arc;

use bookmeta_pipeline::store::CsvBookStore;
use bookmeta_pipeline::BookWorkflow;

use crate::config::ServerConfig;
use crate::engine::JobManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything lives behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Chunked job engine (store, runner, progress broadcaster).
    pub jobs: Arc<JobManager>,
    /// Scrape, infer and persist pipeline used by the synchronous endpoints.
    pub workflow: Arc<BookWorkflow>,
    /// The CSV file books are saved to; also served for export.
    pub books: Arc<CsvBookStore>,
}
