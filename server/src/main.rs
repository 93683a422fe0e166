mod config;
mod error;
mod events;
mod notifier;
mod room;
mod web;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use config::ServerConfig;
use notifier::{LogNotifier, Notifier, SlackNotifier};
use room::RoomController;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the info default
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let cfg = if Path::new(&path).exists() {
        ServerConfig::load(Path::new(&path))?
    } else {
        tracing::warn!("config file {} not found, using defaults", path);
        ServerConfig::default()
    };

    let notifier: Arc<dyn Notifier> = if cfg.notifier.enabled() {
        Arc::new(
            SlackNotifier::connect(&cfg.notifier)
                .await
                .context("failed to connect slack notifier")?,
        )
    } else {
        tracing::warn!("no slack token configured, state changes only reach the log");
        Arc::new(LogNotifier)
    };

    let idle = Duration::from_secs_f64(cfg.controller.time_without_event_to_declare_idle_secs);
    let controller = Arc::new(RoomController::new(idle, notifier));
    tracing::info!("room starts free, idle timeout {:.0}s", idle.as_secs_f64());

    web::serve(&cfg, controller).await
}
