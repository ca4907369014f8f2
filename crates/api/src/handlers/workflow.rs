//! Handlers for `/workflow`: the full scrape, infer and persist pipeline run
//! synchronously on a small batch.
//!
//! Large batches belong on `/jobs`; these endpoints reject more than
//! `MAX_SYNC_BATCH` ISBNs.

use std::time::Instant;

use axum::extract::{Multipart, Query, State};
use axum::Json;
use bookmeta_core::chunking::dedupe_preserving_order;
use bookmeta_core::isbn::{clean_identifiers, validate_batch};
use bookmeta_core::job::JobSummary;
use bookmeta_core::sites::resolve_site_id;
use bookmeta_core::step_result::StepResult;
use bookmeta_pipeline::PipelineStep;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::handlers::upload::{read_isbn_csv, CsvFileInfo};
use crate::response::DataResponse;
use crate::state::AppState;

/// Either a single `isbn` or a list of `isbns` (both are merged).
#[derive(Debug, Default, Deserialize)]
pub struct WorkflowRequest {
    pub isbn: Option<String>,
    pub isbns: Option<Vec<String>>,
    pub site: Option<String>,
}

impl WorkflowRequest {
    fn identifiers(&self) -> Vec<String> {
        let raw = self.isbn.iter().chain(self.isbns.iter().flatten());
        dedupe_preserving_order(&clean_identifiers(raw))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WorkflowCsvParams {
    pub site: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WorkflowSummary {
    #[serde(flatten)]
    pub counts: JobSummary,
    pub total_duration_ms: u64,
    pub average_duration_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub site: &'static str,
    pub results: IndexMap<String, StepResult>,
    pub summary: WorkflowSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_file_info: Option<CsvFileInfo>,
}

/// POST /api/v1/workflow
pub async fn run_workflow(
    State(state): State<AppState>,
    Json(input): Json<WorkflowRequest>,
) -> AppResult<Json<DataResponse<WorkflowResponse>>> {
    let isbns = input.identifiers();
    validate_batch(&isbns, state.config.max_sync_batch)?;
    let site = resolve_site_id(input.site.as_deref());

    let data = process_batch(&state, &isbns, site).await;
    Ok(Json(DataResponse { data }))
}

/// POST /api/v1/workflow/csv
pub async fn run_workflow_csv(
    State(state): State<AppState>,
    Query(params): Query<WorkflowCsvParams>,
    multipart: Multipart,
) -> AppResult<Json<DataResponse<WorkflowResponse>>> {
    let (import, info) = read_isbn_csv(multipart).await?;
    validate_batch(&import.isbns, state.config.max_sync_batch)?;
    let site = resolve_site_id(params.site.as_deref());

    let mut data = process_batch(&state, &import.isbns, site).await;
    data.csv_file_info = Some(info);
    Ok(Json(DataResponse { data }))
}

/// Run each ISBN through the workflow in order.
async fn process_batch(state: &AppState, isbns: &[String], site: &'static str) -> WorkflowResponse {
    let started = Instant::now();
    let mut results = IndexMap::with_capacity(isbns.len());
    for isbn in isbns {
        let result = state.workflow.process_one(isbn, site).await;
        results.insert(isbn.clone(), result);
    }
    let total_duration_ms = started.elapsed().as_millis() as u64;

    let counts = JobSummary::from_results(isbns.len(), results.values());
    tracing::info!(
        site,
        total = counts.total,
        ai_successful = counts.ai_successful,
        csv_successful = counts.csv_successful,
        duplicates = counts.duplicates,
        failed = counts.failed,
        total_duration_ms,
        "Synchronous workflow finished",
    );

    WorkflowResponse {
        site,
        results,
        summary: WorkflowSummary {
            average_duration_ms: total_duration_ms / counts.total.max(1) as u64,
            counts,
            total_duration_ms,
        },
        csv_file_info: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_and_list_identifiers_are_merged_and_deduplicated() {
        let request = WorkflowRequest {
            isbn: Some(" 9788804668237 ".into()),
            isbns: Some(vec!["9788804668237".into(), "".into(), "9780306406157".into()]),
            site: None,
        };
        assert_eq!(
            request.identifiers(),
            vec!["9788804668237".to_string(), "9780306406157".to_string()]
        );
    }
}
