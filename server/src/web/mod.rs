//! HTTP surface: REST routes, the debug-audio WebSocket and static assets.

mod routes;
mod stream;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use crate::config::ServerConfig;
use crate::room::RoomController;

pub use routes::build_router;

/// Application state shared across all requests.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<RoomController>,
    pub debug_stream: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(controller: Arc<RoomController>) -> Self {
        Self {
            controller,
            debug_stream: broadcast::channel(stream::DEBUG_STREAM_CAPACITY).0,
        }
    }
}

/// Bind and serve until shutdown.
pub async fn serve(cfg: &ServerConfig, controller: Arc<RoomController>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .with_context(|| {
            format!("invalid listen address {}:{}", cfg.server.host, cfg.server.port)
        })?;

    if !Path::new(&cfg.assets_dir).is_dir() {
        tracing::warn!(
            "assets directory '{}' not found, /assets will answer 404",
            cfg.assets_dir
        );
    }

    let state = AppState::new(controller);
    let app = build_router(&cfg.assets_dir).with_state(state);

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app.into_make_service())
        .await
        .context("server error")?;
    Ok(())
}
