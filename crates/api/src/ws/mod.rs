//! WebSocket transport for job progress.
//!
//! The same snapshots as the SSE stream, wrapped in a typed envelope so a
//! client can tell progress from completion without inspecting the status.

mod handler;

pub use handler::job_progress_ws;
