//! Handlers for `/books`: manual saves into the CSV book store and export
//! of the whole file.

use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::Json;
use bookmeta_core::error::CoreError;
use bookmeta_core::isbn::normalize;
use bookmeta_pipeline::extract::{flatten_book_data, parse_model_json};
use bookmeta_pipeline::store::{AppendOutcome, BookRecord, BookStore};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Download name of the exported CSV.
pub const EXPORT_FILENAME: &str = "ai_responses.csv";

#[derive(Debug, Deserialize)]
pub struct SaveBookRequest {
    pub isbn: String,
    /// Model output: a JSON object, or the raw reply text containing one.
    pub ai_response: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SaveBookResponse {
    pub success: bool,
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<BookRecord>,
}

/// POST /api/v1/books
///
/// Saves the record unless a row for the ISBN already exists.
pub async fn save_book(
    State(state): State<AppState>,
    Json(input): Json<SaveBookRequest>,
) -> AppResult<Json<DataResponse<SaveBookResponse>>> {
    let isbn = normalize(&input.isbn);
    if isbn.is_empty() {
        return Err(AppError::BadRequest("ISBN is required".to_string()));
    }

    let record = book_record(&input.ai_response)?;
    let outcome = state.books.append_if_absent(&isbn, &record).await?;
    let duplicate = outcome == AppendOutcome::Duplicate;
    tracing::info!(isbn = %isbn, duplicate, "Book save requested");

    Ok(Json(DataResponse {
        data: SaveBookResponse {
            success: true,
            duplicate,
            record: (!duplicate).then_some(record),
        },
    }))
}

/// GET /api/v1/books/export
pub async fn export_books(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let bytes = state
        .books
        .read_all()
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "CSV file",
            id: state.books.path().display().to_string(),
        })?;

    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILENAME}\""),
            ),
        ],
        bytes,
    ))
}

/// Turn the submitted model output into a storable record.
fn book_record(ai_response: &serde_json::Value) -> AppResult<BookRecord> {
    let parsed = match ai_response {
        serde_json::Value::String(text) => parse_model_json(text).ok_or_else(|| {
            CoreError::Validation("ai_response is not valid JSON".to_string())
        })?,
        other => other.clone(),
    };
    let record = flatten_book_data(&parsed);
    if record.is_empty() {
        return Err(CoreError::Validation("ai_response has no fields to save".to_string()).into());
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn record_from_object_or_text() {
        let from_object = book_record(&json!({"title": "Il nome della rosa", "isbn": "9788804668237"}))
            .unwrap();
        assert_eq!(from_object["title"], "Il nome della rosa");

        let from_text =
            book_record(&json!("```json\n{\"title\": \"Baudolino\", \"pages\": 526}\n```")).unwrap();
        assert_eq!(from_text["pages"], "526");
    }

    #[test]
    fn unusable_responses_are_validation_errors() {
        assert_matches!(
            book_record(&json!("not json at all")),
            Err(AppError::Core(CoreError::Validation(_)))
        );
        assert_matches!(
            book_record(&json!({})),
            Err(AppError::Core(CoreError::Validation(_)))
        );
        assert_matches!(
            book_record(&json!([1, 2])),
            Err(AppError::Core(CoreError::Validation(_)))
        );
    }
}
