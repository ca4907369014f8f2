//! The per-identifier unit of work driven by the job runner.

use async_trait::async_trait;
use bookmeta_core::step_result::StepResult;

/// Processes one identifier through the whole pipeline.
///
/// Never fails across this boundary: every problem is reported in the
/// returned [`StepResult`]. Implementations bound their own duration.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    async fn process_one(&self, isbn: &str, site_id: &str) -> StepResult;
}
