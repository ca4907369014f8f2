//! Outcome of running one ISBN through the full metadata pipeline.

use serde::{Deserialize, Serialize};

/// Pipeline stage at which processing of an identifier stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Fetching the retailer page failed.
    Scrape,
    /// The page was fetched but held no usable content.
    Content,
    /// The language model call failed or returned unparsable output.
    Inference,
    /// Writing to the persisted store failed.
    Persist,
    /// The pipeline step itself broke (e.g. panicked).
    Internal,
}

/// Why processing of an identifier stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub stage: PipelineStage,
    pub message: String,
}

/// Result of processing one identifier.
///
/// Stage flags are set in pipeline order; once `error` is set no later
/// stage flag is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub isbn: String,
    /// Display name of the retailer the page came from.
    pub source: Option<String>,
    pub scrape_success: bool,
    pub ai_success: bool,
    pub csv_success: bool,
    /// The ISBN was already present in the store; nothing was written.
    pub csv_duplicate: bool,
    pub book_data: Option<serde_json::Value>,
    pub error: Option<StepFailure>,
    pub duration_ms: u64,
}

impl StepResult {
    /// A fresh result with every stage still unattempted.
    pub fn new(isbn: impl Into<String>) -> Self {
        Self {
            isbn: isbn.into(),
            source: None,
            scrape_success: false,
            ai_success: false,
            csv_success: false,
            csv_duplicate: false,
            book_data: None,
            error: None,
            duration_ms: 0,
        }
    }

    /// A result that failed at `stage` before anything succeeded.
    pub fn failed(isbn: impl Into<String>, stage: PipelineStage, message: impl Into<String>) -> Self {
        Self::new(isbn).with_failure(stage, message)
    }

    /// Record the failure that stopped processing.
    pub fn with_failure(mut self, stage: PipelineStage, message: impl Into<String>) -> Self {
        self.error = Some(StepFailure {
            stage,
            message: message.into(),
        });
        self
    }

    /// Set the elapsed time of the step.
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// All stages succeeded (a duplicate counts as persisted).
    pub fn is_complete_success(&self) -> bool {
        self.error.is_none() && self.scrape_success && self.ai_success && self.csv_success
    }

    /// Client-facing alias for a successful scrape.
    pub fn found(&self) -> bool {
        self.scrape_success
    }
}
