//! WebSocket feed of a session's broadcasts

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::{ApiError, ApiState};
use crate::broadcast::Envelope;

/// Build WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/sessions/{id}/observe", get(ws_upgrade))
        .with_state(state)
}

/// Upgrade to an observer socket; the subscription starts before the handshake
async fn ws_upgrade(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let envelopes = state.turns.observe(&session_id).await?;

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, session_id, envelopes))
        .into_response())
}

/// Forward envelopes until either side goes away
async fn handle_socket(
    socket: WebSocket,
    session_id: String,
    mut envelopes: mpsc::Receiver<Envelope>,
) {
    let (mut sender, mut receiver) = socket.split();

    tracing::info!(session_id = %session_id, "observer connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(envelope) = envelopes.recv().await {
            match serde_json::to_string(&envelope) {
                Ok(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "failed to encode envelope"),
            }
        }
        // Session ended; close politely
        let _ = sender.send(Message::Close(None)).await;
    });

    let session_id_clone = session_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Ping(data) => {
                    tracing::trace!(len = data.len(), "received ping");
                }
                Message::Close(_) => {
                    tracing::debug!(session_id = %session_id_clone, "observer closed socket");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!(session_id = %session_id, "observer disconnected");
}
