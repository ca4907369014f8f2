//! Full metadata workflow for one ISBN.
//!
//! scrape → content check → prompt → model → JSON parse → save unless
//! duplicate. Each stage that fails stops processing of that ISBN and is
//! recorded on the returned [`StepResult`]; nothing is raised to the caller.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bookmeta_core::sites;
use bookmeta_core::step_result::{PipelineStage, StepResult};

use crate::extract::{build_prompt, flatten_book_data, parse_model_json};
use crate::llm::MetadataModel;
use crate::scrape::{PageContent, PageSource, ScrapeError};
use crate::step::PipelineStep;
use crate::store::{AppendOutcome, BookStore};

/// Scrape, infer and persist using the given collaborators.
#[derive(Clone)]
pub struct BookWorkflow {
    pages: Arc<dyn PageSource>,
    model: Arc<dyn MetadataModel>,
    store: Arc<dyn BookStore>,
}

impl BookWorkflow {
    pub fn new(
        pages: Arc<dyn PageSource>,
        model: Arc<dyn MetadataModel>,
        store: Arc<dyn BookStore>,
    ) -> Self {
        Self {
            pages,
            model,
            store,
        }
    }

    pub fn model(&self) -> &Arc<dyn MetadataModel> {
        &self.model
    }

    /// Fetch the page only, without inference or persistence.
    ///
    /// Unknown site ids fall back to the default retailer.
    pub async fn scrape_only(&self, isbn: &str, site_id: &str) -> Result<PageContent, ScrapeError> {
        self.pages.fetch(isbn, sites::site(site_id)).await
    }

    async fn run(&self, isbn: &str, site_id: &str) -> StepResult {
        let site = sites::site(site_id);
        let mut result = StepResult::new(isbn);
        tracing::info!(isbn, site = site.id, "Starting book workflow");

        // Scrape.
        let page = match self.pages.fetch(isbn, site).await {
            Ok(page) => page,
            Err(e) => return result.with_failure(PipelineStage::Scrape, e.to_string()),
        };
        result.scrape_success = true;
        result.source = Some(page.source.clone());

        if !page.found || page.text.trim().is_empty() {
            return result.with_failure(PipelineStage::Content, "No content found for this ISBN");
        }

        // Inference.
        let completion = match self.model.complete(&build_prompt(&page.text)).await {
            Ok(completion) => completion,
            Err(e) => {
                return result
                    .with_failure(PipelineStage::Inference, format!("AI processing failed: {e}"))
            }
        };
        let Some(book_data) = parse_model_json(&completion.text) else {
            return result.with_failure(
                PipelineStage::Inference,
                "Failed to parse AI response as JSON",
            );
        };
        if !book_data.is_object() {
            return result.with_failure(
                PipelineStage::Inference,
                "AI response is not a JSON object",
            );
        }
        result.ai_success = true;
        let record = flatten_book_data(&book_data);
        result.book_data = Some(book_data);

        // Persist.
        match self.store.append_if_absent(isbn, &record).await {
            Ok(outcome) => {
                result.csv_success = true;
                result.csv_duplicate = outcome == AppendOutcome::Duplicate;
                result
            }
            Err(e) => result.with_failure(PipelineStage::Persist, format!("CSV save failed: {e}")),
        }
    }
}

#[async_trait]
impl PipelineStep for BookWorkflow {
    async fn process_one(&self, isbn: &str, site_id: &str) -> StepResult {
        let started = Instant::now();
        let result = self.run(isbn, site_id).await;
        let result = result.with_duration_ms(started.elapsed().as_millis() as u64);

        match &result.error {
            Some(failure) => tracing::warn!(
                isbn,
                stage = ?failure.stage,
                error = %failure.message,
                duration_ms = result.duration_ms,
                "Book workflow failed",
            ),
            None => tracing::info!(
                isbn,
                duplicate = result.csv_duplicate,
                duration_ms = result.duration_ms,
                "Book workflow completed",
            ),
        }
        result
    }
}
