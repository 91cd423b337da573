//! Live progress over WebSocket
//!
//! `GET /ws/bulk/:batch_id` sends the batch's current snapshot as soon as
//! the socket opens, then every snapshot the engine publishes. The server
//! closes the socket after a `completed` or `failed` snapshot. An unknown
//! batch gets a single error frame.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;

use crate::features::FeatureState;
use crate::models::ProgressSnapshot;
use crate::store::OperationStore;

pub fn progress_routes() -> Router<FeatureState> {
    Router::new().route("/:batch_id", get(progress_socket))
}

#[tracing::instrument(skip(ws, state))]
async fn progress_socket(
    ws: WebSocketUpgrade,
    State(state): State<FeatureState>,
    Path(batch_id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| stream_progress(socket, state, batch_id))
}

fn frame(snapshot: &ProgressSnapshot) -> Option<Message> {
    match serde_json::to_string(snapshot) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize progress snapshot");
            None
        },
    }
}

async fn stream_progress(socket: WebSocket, state: FeatureState, batch_id: String) {
    let (mut ws_write, mut ws_read) = socket.split();

    // Register before reading the current state so no snapshot falls between
    let mut receiver = state.progress.register(&batch_id);

    let current = match state.store.get_operation(&batch_id).await {
        Ok(Some(operation)) => operation.snapshot(),
        Ok(None) => {
            let body = json!({ "batch_id": batch_id, "error": "Bulk operation not found" });
            let _ = ws_write.send(Message::Text(body.to_string().into())).await;
            let _ = ws_write.close().await;
            state.progress.unregister(&batch_id);
            return;
        },
        Err(e) => {
            tracing::error!(batch_id = %batch_id, error = %e, "Progress lookup failed");
            let _ = ws_write.close().await;
            state.progress.unregister(&batch_id);
            return;
        },
    };

    tracing::info!(batch_id = %batch_id, "Progress stream connected");

    let mut finished = current.status.is_terminal();
    if let Some(message) = frame(&current) {
        if ws_write.send(message).await.is_err() {
            finished = true;
        }
    }

    let mut read_task = tokio::spawn(async move {
        while let Some(msg) = ws_read.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {},
            }
        }
    });

    while !finished {
        tokio::select! {
            result = receiver.recv() => {
                match result {
                    Ok(snapshot) => {
                        finished = snapshot.status.is_terminal();
                        if let Some(message) = frame(&snapshot) {
                            if let Err(e) = ws_write.send(message).await {
                                tracing::debug!(error = %e, "Progress stream write error");
                                break;
                            }
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!(batch_id = %batch_id, skipped = n, "Progress stream lagged");
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            },
            _ = &mut read_task => break,
        }
    }

    read_task.abort();
    let _ = ws_write.close().await;
    state.progress.unregister(&batch_id);
    tracing::info!(batch_id = %batch_id, "Progress stream disconnected");
}
