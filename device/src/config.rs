//! Device configuration, loaded from a JSON file at startup.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use url::Url;

use crate::dsp::threshold::PeakPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub audio: AudioSection,
    pub detector: DetectorConfig,
    pub backend: BackendSection,
    pub indicator: IndicatorSection,
    pub debug: DebugSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSection {
    /// ALSA capture device name, e.g. "default" or "plughw:1,0".
    pub device: String,
    pub sample_rate: u32,
    pub window_size_ms: u32,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            device: "default".to_string(),
            sample_rate: 16_000,
            window_size_ms: 32,
        }
    }
}

impl AudioSection {
    /// Samples per analysis window.
    pub fn window_size_samples(&self) -> usize {
        (self.sample_rate as u64 * self.window_size_ms as u64 / 1000) as usize
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Cutoff of the high-pass that strips low-frequency room rumble.
    pub highpass_filter_cutoff_freq: f64,
    pub rolling_max_short_decay_factor: f32,
    pub rolling_max_long_decay_factor: f32,
    pub rolling_max_seed: f32,
    pub bounce_threshold: f32,
    pub peak_policy: PeakPolicy,
    /// Capture gives up when a run of consecutive anomalies reaches this
    /// length.
    pub max_read_failures: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            highpass_filter_cutoff_freq: 300.0,
            rolling_max_short_decay_factor: 0.6,
            rolling_max_long_decay_factor: 0.999,
            rolling_max_seed: 500.0,
            bounce_threshold: 5.0,
            peak_policy: PeakPolicy::Abs,
            max_read_failures: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    pub server_url: String,
    pub request_timeout_ms: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:12345".to_string(),
            request_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndicatorSection {
    /// Name of a sysfs LED under /sys/class/leds, if the box has one.
    pub led: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DebugSection {
    /// POST every analyzed window to the backend for the live stream.
    pub stream_samples: bool,
    /// Record raw capture windows to this WAV file.
    pub wav_path: Option<String>,
}

impl DeviceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would otherwise only fail at the point of use.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            bail!("audio.sample_rate must be positive");
        }
        if self.audio.window_size_samples() == 0 {
            bail!("audio.window_size_ms must cover at least one sample");
        }
        let nyquist = self.audio.sample_rate as f64 / 2.0;
        let cutoff = self.detector.highpass_filter_cutoff_freq;
        if !(cutoff > 0.0 && cutoff < nyquist) {
            bail!("detector.highpass_filter_cutoff_freq must lie in (0, {nyquist}), got {cutoff}");
        }
        for (name, value) in [
            (
                "detector.rolling_max_short_decay_factor",
                self.detector.rolling_max_short_decay_factor,
            ),
            (
                "detector.rolling_max_long_decay_factor",
                self.detector.rolling_max_long_decay_factor,
            ),
        ] {
            if !(value > 0.0 && value < 1.0) {
                bail!("{name} must lie in (0, 1), got {value}");
            }
        }
        if self.detector.rolling_max_seed <= 0.0 {
            bail!("detector.rolling_max_seed must be positive");
        }
        if self.detector.bounce_threshold <= 0.0 {
            bail!("detector.bounce_threshold must be positive");
        }
        if self.detector.max_read_failures == 0 {
            bail!("detector.max_read_failures must be at least 1");
        }
        Url::parse(&self.backend.server_url)
            .with_context(|| format!("invalid backend.server_url '{}'", self.backend.server_url))?;
        if self.backend.request_timeout_ms == 0 {
            bail!("backend.request_timeout_ms must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        DeviceConfig::default().validate().unwrap();
    }

    #[test]
    fn default_window_is_512_samples() {
        assert_eq!(AudioSection::default().window_size_samples(), 512);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let cfg: DeviceConfig = serde_json::from_str(
            r#"{
                "audio": { "device": "plughw:1,0" },
                "detector": { "bounce_threshold": 7.5 },
                "backend": { "server_url": "http://pingpong.local:12345" }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.audio.device, "plughw:1,0");
        assert_eq!(cfg.audio.sample_rate, 16_000);
        assert_eq!(cfg.detector.bounce_threshold, 7.5);
        assert_eq!(cfg.detector.max_read_failures, 10);
        assert_eq!(cfg.backend.server_url, "http://pingpong.local:12345");
        cfg.validate().unwrap();
    }

    #[test]
    fn peak_policy_parses_lowercase_names() {
        let cfg: DeviceConfig =
            serde_json::from_str(r#"{ "detector": { "peak_policy": "max" } }"#).unwrap();
        assert_eq!(cfg.detector.peak_policy, PeakPolicy::Max);
    }

    #[test]
    fn decay_outside_unit_interval_is_rejected() {
        let mut cfg = DeviceConfig::default();
        cfg.detector.rolling_max_long_decay_factor = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cutoff_above_nyquist_is_rejected() {
        let mut cfg = DeviceConfig::default();
        cfg.detector.highpass_filter_cutoff_freq = 9_000.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn garbage_server_url_is_rejected() {
        let mut cfg = DeviceConfig::default();
        cfg.backend.server_url = "not a url".to_string();
        assert!(cfg.validate().is_err());
    }
}
