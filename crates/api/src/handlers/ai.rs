//! Handler for `/ai`: a raw call to the metadata model.

use axum::extract::State;
use axum::Json;
use bookmeta_pipeline::extract::parse_model_json;
use bookmeta_pipeline::llm::TokenUsage;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    /// Parsed JSON reply, or `{error, original_text}` when the reply is not
    /// JSON.
    pub response: serde_json::Value,
    pub token_usage: Option<TokenUsage>,
}

/// POST /api/v1/ai/complete
pub async fn complete(
    State(state): State<AppState>,
    Json(input): Json<CompletionRequest>,
) -> AppResult<Json<DataResponse<CompletionResponse>>> {
    if input.prompt.trim().is_empty() {
        return Err(AppError::BadRequest("Prompt is required".to_string()));
    }

    let completion = state.workflow.model().complete(&input.prompt).await?;
    let response = parse_model_json(&completion.text).unwrap_or_else(|| {
        tracing::warn!(chars = completion.text.len(), "Model reply is not JSON");
        json!({
            "error": "Failed to parse JSON response",
            "original_text": completion.text,
        })
    });

    Ok(Json(DataResponse {
        data: CompletionResponse {
            response,
            token_usage: completion.usage,
        },
    }))
}
