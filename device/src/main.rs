mod audio;
mod backend;
mod config;
mod detector;
mod dsp;
mod events;
mod indicator;
mod wav;

use std::path::Path;

use anyhow::Context;
use tokio::signal;

use audio::CapturePipeline;
use backend::BackendClient;
use config::DeviceConfig;
use indicator::Indicator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Load configuration, falling back to defaults when no file is present
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let cfg = if Path::new(&path).exists() {
        DeviceConfig::load(Path::new(&path))?
    } else {
        log::warn!("config file {} not found, using defaults", path);
        DeviceConfig::default()
    };

    let indicator = Indicator::new(cfg.indicator.led.as_deref());
    let backend = BackendClient::new(&cfg.backend)?;

    // Check the backend before listening starts. A miss is worth an error
    // blink but not an abort, the server may simply come up later.
    match backend.ping().await {
        Ok(()) => {
            log::info!("backend reachable at {}", cfg.backend.server_url);
            indicator.info().await;
        }
        Err(e) => {
            log::warn!("backend not reachable: {:#}", e);
            indicator.error().await;
        }
    }

    let (mut capture, mut debug_windows) =
        CapturePipeline::start(&cfg).context("failed to start capture pipeline")?;
    log::info!("bounce detector running, reporting to {}", cfg.backend.server_url);

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                log::info!("received ctrl-c, shutting down");
                break;
            }
            event = capture.next_event() => {
                match event {
                    Ok(event) => {
                        match backend.send_event(&event).await {
                            Ok(()) => indicator.bounce().await,
                            Err(e) => {
                                log::error!(
                                    "failed to report bounce #{}: {:#}",
                                    event.bounce_ctr,
                                    e
                                );
                                indicator.error().await;
                            }
                        }
                    }
                    Err(e) => {
                        indicator.error().await;
                        return Err(e).context("bounce detection stopped");
                    }
                }
            }
            Some(window) = debug_windows.recv() => {
                if let Err(e) = backend.send_debug_samples(&window).await {
                    log::debug!("failed to stream debug samples: {:#}", e);
                }
            }
        }
    }

    Ok(())
}
