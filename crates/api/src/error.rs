use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bookmeta_core::error::CoreError;
use bookmeta_core::job::JobError;
use bookmeta_pipeline::llm::LlmError;
use bookmeta_pipeline::scrape::ScrapeError;
use bookmeta_pipeline::store::StoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain and pipeline errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `bookmeta_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A job engine error (unknown job, empty input, bookkeeping).
    #[error(transparent)]
    Job(#[from] JobError),

    /// Fetching a retailer page failed.
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    /// The language model call failed.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The persisted book store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
            },

            // --- Job engine ---
            AppError::Job(job) => match job {
                JobError::EmptyInput => (StatusCode::BAD_REQUEST, "EMPTY_INPUT", job.to_string()),
                JobError::NotFound(_) => (StatusCode::NOT_FOUND, "JOB_NOT_FOUND", job.to_string()),
                other => internal("Job bookkeeping error", &other.to_string()),
            },

            // --- Pipeline collaborators ---
            AppError::Scrape(err) => (StatusCode::BAD_GATEWAY, "SCRAPE_FAILED", err.to_string()),
            AppError::Llm(LlmError::MissingApiKey) => {
                internal("Language model not configured", &LlmError::MissingApiKey.to_string())
            }
            AppError::Llm(err) => (StatusCode::BAD_GATEWAY, "AI_FAILED", err.to_string()),
            AppError::Store(err) => internal("Book store error", &err.to_string()),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Log the real cause and hide it behind a generic 500.
fn internal(context: &str, detail: &str) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %detail, "{context}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
