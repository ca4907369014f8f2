//! The book metadata pipeline: scrape a retailer page, ask a language model
//! for structured metadata, and persist it.
//!
//! - [`step::PipelineStep`] is what the job runner drives, one identifier at a time.
//! - [`workflow::BookWorkflow`] implements it on top of three collaborators:
//!   [`scrape::PageSource`], [`llm::MetadataModel`] and [`store::BookStore`].

pub mod extract;
pub mod llm;
pub mod scrape;
pub mod step;
pub mod store;
pub mod workflow;

pub use step::PipelineStep;
pub use workflow::BookWorkflow;
