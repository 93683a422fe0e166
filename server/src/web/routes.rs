//! REST route handlers.

use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use tower_http::services::ServeDir;

use super::AppState;
use super::stream::{audio_samples, ws_handler};
use crate::events::EventEnvelope;
use crate::room::RoomSnapshot;

/// Build the API router; `assets_dir` is mounted under `/assets`.
pub fn build_router(assets_dir: &str) -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/pingpong-event", post(pingpong_event))
        .route("/room-state", get(room_state))
        .route("/audio-samples", post(audio_samples))
        .route("/ws/audio-stream", get(ws_handler))
        .nest_service("/assets", ServeDir::new(assets_dir))
}

/// GET /ping - device liveness check.
async fn ping() -> Json<Value> {
    tracing::debug!("ping received");
    Json(json!({ "status": "ok" }))
}

/// POST /pingpong-event - bounce ingestion from the device.
async fn pingpong_event(
    State(state): State<AppState>,
    payload: Result<Json<EventEnvelope>, JsonRejection>,
) -> Result<Json<Value>, Response> {
    let Json(envelope) = payload.map_err(bad_body)?;
    state
        .controller
        .handle_event(envelope.event)
        .await
        .map_err(|e| {
            tracing::error!("rejected event: {}", e);
            e.into_response()
        })?;
    Ok(Json(json!({ "status": "ok" })))
}

/// GET /room-state - current occupancy.
async fn room_state(State(state): State<AppState>) -> Json<RoomSnapshot> {
    Json(state.controller.room_state().await)
}

pub(super) fn bad_body(rejection: JsonRejection) -> Response {
    tracing::error!("invalid request body: {}", rejection);
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "invalid JSON body" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{LogNotifier, Notifier};
    use crate::room::RoomController;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_state() -> AppState {
        let notifier = Arc::new(LogNotifier) as Arc<dyn Notifier>;
        AppState::new(Arc::new(RoomController::new(
            Duration::from_secs(300),
            notifier,
        )))
    }

    #[tokio::test]
    async fn ping_answers_ok() {
        let Json(body) = ping().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn a_posted_bounce_takes_the_room() {
        let state = test_state();
        let envelope: EventEnvelope = serde_json::from_value(json!({
            "event": { "type": "bounce-detected", "timestamp": 10, "bounce_ctr": 1 }
        }))
        .unwrap();

        let reply = pingpong_event(State(state.clone()), Ok(Json(envelope)))
            .await
            .expect("valid event must be accepted");
        assert_eq!(reply.0["status"], "ok");

        let Json(snapshot) = room_state(State(state)).await;
        assert_eq!(snapshot.state, "taken");
    }

    #[tokio::test]
    async fn an_unknown_event_leaves_the_room_alone() {
        let state = test_state();
        let envelope: EventEnvelope =
            serde_json::from_value(json!({ "event": { "type": "coffee-brewed" } })).unwrap();

        let response = pingpong_event(State(state.clone()), Ok(Json(envelope)))
            .await
            .unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let Json(snapshot) = room_state(State(state)).await;
        assert_eq!(snapshot.state, "free");
    }

    #[tokio::test]
    async fn router_rejects_a_non_json_body() {
        use tower::ServiceExt;

        let app = build_router("assets").with_state(test_state());
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/pingpong-event")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn router_serves_room_state() {
        use tower::ServiceExt;

        let app = build_router("assets").with_state(test_state());
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/room-state")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn router_answers_ping() {
        use tower::ServiceExt;

        let app = build_router("assets").with_state(test_state());
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/ping")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
