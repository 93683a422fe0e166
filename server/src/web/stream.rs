//! Live debug-audio streaming: the device POSTs analyzed windows, browsers
//! watch them over a WebSocket.

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::broadcast;

use super::AppState;
use super::routes::bad_body;
use crate::events::{DEBUG_SAMPLES, EventEnvelope};

/// Broadcast backlog a slow WebSocket client may fall behind by before it
/// starts losing windows.
pub const DEBUG_STREAM_CAPACITY: usize = 64;

/// POST /audio-samples - accept one debug window and fan it out.
pub async fn audio_samples(
    State(state): State<AppState>,
    payload: Result<Json<EventEnvelope>, JsonRejection>,
) -> Result<Json<Value>, Response> {
    let Json(envelope) = payload.map_err(bad_body)?;

    let kind = envelope.event.get("type").and_then(Value::as_str);
    if kind != Some(DEBUG_SAMPLES) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "expected a debug-samples event" })),
        )
            .into_response());
    }

    // Nobody watching is not an error; the device keeps posting blindly.
    let clients = state.debug_stream.receiver_count();
    if clients > 0 {
        let _ = state.debug_stream.send(envelope.event.to_string());
    }
    Ok(Json(json!({ "status": "ok", "clients": clients })))
}

/// GET /ws/audio-stream - WebSocket upgrade for debug-stream watchers.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| stream_to_client(socket, state))
}

async fn stream_to_client(socket: WebSocket, state: AppState) {
    let mut updates = state.debug_stream.subscribe();
    let (mut sender, mut receiver) = socket.split();

    tracing::info!(
        "debug stream client connected ({} watching)",
        state.debug_stream.receiver_count()
    );

    loop {
        tokio::select! {
            update = updates.recv() => {
                match update {
                    Ok(text) => {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("debug stream client lagged, {} windows skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("debug stream client error: {}", e);
                        break;
                    }
                    // Watchers only listen; ignore anything they say.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::info!("debug stream client disconnected");
}
