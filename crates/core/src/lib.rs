//! Domain types and pure logic for the book metadata service.
//!
//! No I/O lives here: the job model and its state transitions, chunking,
//! ISBN handling, the retailer catalogue and the per-ISBN result type.

pub mod chunking;
pub mod error;
pub mod isbn;
pub mod job;
pub mod job_events;
pub mod sites;
pub mod step_result;
pub mod types;
