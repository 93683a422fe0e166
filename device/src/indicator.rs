//! Status feedback through the Linux sysfs LED class.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::sleep;

const BLINK_MS: u64 = 128;

/// Blinks a sysfs LED (`/sys/class/leds/<name>/brightness`): one blink for
/// startup and per detected bounce, three for errors.
///
/// Boxes without a configured or present LED get a no-op indicator.
pub struct Indicator {
    brightness: Option<PathBuf>,
}

impl Indicator {
    pub fn new(led: Option<&str>) -> Self {
        let brightness = led.and_then(|name| {
            let path = Path::new("/sys/class/leds").join(name).join("brightness");
            if path.exists() {
                Some(path)
            } else {
                log::warn!("LED {} not present, indicator disabled", path.display());
                None
            }
        });
        Self { brightness }
    }

    /// Startup and liveness feedback.
    pub async fn info(&self) {
        self.blink(1).await;
    }

    /// One blink per detected bounce.
    pub async fn bounce(&self) {
        self.blink(1).await;
    }

    /// Triple blink for anything that went wrong.
    pub async fn error(&self) {
        self.blink(3).await;
    }

    async fn blink(&self, times: u32) {
        let Some(path) = &self.brightness else { return };
        for _ in 0..times {
            write_brightness(path, "1");
            sleep(Duration::from_millis(BLINK_MS)).await;
            write_brightness(path, "0");
            sleep(Duration::from_millis(BLINK_MS)).await;
        }
    }
}

fn write_brightness(path: &Path, value: &str) {
    if let Err(e) = std::fs::write(path, value) {
        log::debug!("LED write failed: {}", e);
    }
}
