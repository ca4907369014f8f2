use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use bookmeta_core::job::ProgressSnapshot;
use bookmeta_core::job_events::message_type;
use bookmeta_core::types::JobId;
use bookmeta_events::Subscription;
use futures::{SinkExt, StreamExt};
use serde_json::json;

use crate::error::AppResult;
use crate::state::AppState;

/// HTTP handler that upgrades the connection to a WebSocket streaming the
/// progress of one job.
///
/// The subscription is taken before the upgrade so an unknown job id is
/// answered with a plain 404 instead of an empty socket.
pub async fn job_progress_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let subscription = state.jobs.subscribe(&job_id).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, subscription)))
}

/// Forward snapshots to the socket until the job is terminal or the client
/// goes away.
///
/// Splits the socket into a sink (outbound) and stream (inbound):
///   1. A sender task pushes one frame per snapshot, then a Close frame.
///   2. The current task drains inbound frames until Close or error.
///   3. Whichever side finishes first ends the connection.
async fn handle_socket(socket: WebSocket, mut subscription: Subscription) {
    let job_id = subscription.job_id().to_string();
    let subscriber_id = subscription.id();
    tracing::info!(job_id = %job_id, subscriber_id, "Progress WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    let sender_job_id = job_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(snapshot) = subscription.next().await {
            let frame = match progress_frame(&snapshot) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(job_id = %sender_job_id, error = %e, "Failed to encode progress frame");
                    continue;
                }
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                tracing::debug!(job_id = %sender_job_id, "WebSocket sink closed");
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    tracing::info!(job_id = %job_id, subscriber_id, "Progress WebSocket disconnected");
}

/// `{"type": "job_progress" | "job_completed" | "job_failed", "data": snapshot}`.
fn progress_frame(snapshot: &ProgressSnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(&json!({
        "type": message_type(snapshot.status),
        "data": snapshot,
    }))
}

#[cfg(test)]
mod tests {
    use bookmeta_core::job::{Job, JobStatus};
    use chrono::Utc;

    use super::*;

    #[test]
    fn frame_type_follows_status() {
        let now = Utc::now();
        let mut job = Job::new(&["9788804668237".to_string()], 1, "libraccio", now).unwrap();

        let frame: serde_json::Value =
            serde_json::from_str(&progress_frame(&job.snapshot(now)).unwrap()).unwrap();
        assert_eq!(frame["type"], "job_progress");
        assert_eq!(frame["data"]["status"], "pending");

        job.start().unwrap();
        job.fail("boom", now).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        let frame: serde_json::Value =
            serde_json::from_str(&progress_frame(&job.snapshot(now)).unwrap()).unwrap();
        assert_eq!(frame["type"], "job_failed");
        assert_eq!(frame["data"]["error"], "boom");
    }
}
