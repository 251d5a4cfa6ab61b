//! WebSocket progress streams.
//!
//! One socket per job: the job's current snapshot is sent first, then every
//! live update as a JSON text frame. The server closes the socket after the
//! first terminal event, or when the job is deleted.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use dubbing_core::ProgressSubscription;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::jobs::{from_job_error, ApiError};
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_MESSAGES_SENT};
use crate::state::AppState;

/// WebSocket upgrade handler. Unknown jobs are rejected with 404 before upgrading.
pub async fn progress_ws(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let subscription = state.broadcaster().subscribe(&id).map_err(from_job_error)?;
    Ok(ws.on_upgrade(move |socket| stream_progress(socket, subscription)))
}

/// Forward one job's progress to a connected client.
async fn stream_progress(socket: WebSocket, mut subscription: ProgressSubscription) {
    let job_id = subscription.job_id().to_string();
    let (mut sender, mut receiver) = socket.split();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!(job_id = %job_id, "Progress stream opened");

    loop {
        tokio::select! {
            event = subscription.next() => {
                let Some(event) = event else {
                    debug!(job_id = %job_id, "Progress channel closed");
                    break;
                };
                let terminal = event.is_terminal();

                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            debug!(job_id = %job_id, "WebSocket send failed, client disconnected");
                            break;
                        }
                        WS_MESSAGES_SENT
                            .with_label_values(&[event.status.as_str()])
                            .inc();
                    }
                    Err(e) => {
                        error!(job_id = %job_id, "Failed to serialize progress event: {}", e);
                    }
                }

                if terminal {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(job_id = %job_id, "WebSocket client closed the stream");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Clients have nothing to say; pings are answered by axum.
                    }
                    Some(Err(e)) => {
                        warn!(job_id = %job_id, "WebSocket receive error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    WS_CONNECTIONS_ACTIVE.dec();
    info!(job_id = %job_id, "Progress stream closed");
}
