//! Rejection types for inbound device events.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Why an inbound event was rejected. None of these touch room state.
#[derive(Debug, Error)]
pub enum EventError {
    /// The event object carries no `type` discriminator.
    #[error("illegal event: no `type`")]
    MissingType,

    /// The discriminator names an event kind this server does not know.
    #[error("unknown event type: {0}")]
    UnrecognizedType(String),

    /// The discriminator was recognized but the payload did not match it.
    #[error("malformed {kind} event: {source}")]
    BadPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl IntoResponse for EventError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
