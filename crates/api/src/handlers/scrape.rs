//! Handlers for `/scrape`: fetch retailer pages without inference or
//! persistence.

use std::time::Instant;

use axum::extract::State;
use axum::Json;
use bookmeta_core::isbn::{clean_identifiers, normalize, validate_batch};
use bookmeta_core::sites::resolve_site_id;
use bookmeta_pipeline::scrape::PageContent;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    pub isbn: String,
    pub site: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchScrapeRequest {
    pub isbns: Vec<String>,
    pub site: Option<String>,
}

/// One entry of a batch scrape; failures are reported, never raised.
#[derive(Debug, Serialize)]
pub struct BatchScrapeItem {
    pub isbn: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct BatchScrapeSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
    pub average_duration_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct BatchScrapeResponse {
    pub site: &'static str,
    pub results: Vec<BatchScrapeItem>,
    pub summary: BatchScrapeSummary,
}

/// POST /api/v1/scrape
pub async fn scrape_one(
    State(state): State<AppState>,
    Json(input): Json<ScrapeRequest>,
) -> AppResult<Json<DataResponse<PageContent>>> {
    let isbn = normalize(&input.isbn);
    if isbn.is_empty() {
        return Err(AppError::BadRequest("ISBN is required".to_string()));
    }
    let site = resolve_site_id(input.site.as_deref());

    let page = state.workflow.scrape_only(&isbn, site).await?;
    Ok(Json(DataResponse { data: page }))
}

/// POST /api/v1/scrape/batch
///
/// Scrapes sequentially; one failing ISBN does not stop the others.
pub async fn scrape_batch(
    State(state): State<AppState>,
    Json(input): Json<BatchScrapeRequest>,
) -> AppResult<Json<DataResponse<BatchScrapeResponse>>> {
    let isbns = clean_identifiers(&input.isbns);
    validate_batch(&isbns, state.config.max_sync_batch)?;
    let site = resolve_site_id(input.site.as_deref());

    let mut results = Vec::with_capacity(isbns.len());
    for isbn in isbns {
        let started = Instant::now();
        let outcome = state.workflow.scrape_only(&isbn, site).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let item = match outcome {
            Ok(page) => BatchScrapeItem {
                isbn,
                success: true,
                data: Some(page),
                error: None,
                duration_ms,
            },
            Err(e) => {
                tracing::warn!(isbn = %isbn, site, error = %e, "Batch scrape failed for ISBN");
                BatchScrapeItem {
                    isbn,
                    success: false,
                    data: None,
                    error: Some(e.to_string()),
                    duration_ms,
                }
            }
        };
        results.push(item);
    }

    let summary = summarize(&results);
    tracing::info!(
        site,
        total = summary.total,
        successful = summary.successful,
        failed = summary.failed,
        "Batch scrape finished",
    );

    Ok(Json(DataResponse {
        data: BatchScrapeResponse {
            site,
            results,
            summary,
        },
    }))
}

fn summarize(results: &[BatchScrapeItem]) -> BatchScrapeSummary {
    let total = results.len();
    let successful = results.iter().filter(|r| r.success).count();
    let total_duration_ms: u64 = results.iter().map(|r| r.duration_ms).sum();
    BatchScrapeSummary {
        total,
        successful,
        failed: total - successful,
        total_duration_ms,
        average_duration_ms: if total == 0 {
            0
        } else {
            total_duration_ms / total as u64
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(success: bool, duration_ms: u64) -> BatchScrapeItem {
        BatchScrapeItem {
            isbn: "x".into(),
            success,
            data: None,
            error: None,
            duration_ms,
        }
    }

    #[test]
    fn summary_counts_and_averages() {
        let summary = summarize(&[item(true, 100), item(false, 50), item(true, 30)]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_duration_ms, 180);
        assert_eq!(summary.average_duration_ms, 60);
    }

    #[test]
    fn empty_summary_has_zero_average() {
        assert_eq!(summarize(&[]).average_duration_ms, 0);
    }
}
