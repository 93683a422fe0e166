//! Outbound event payloads for the backend.

use std::sync::OnceLock;
use std::time::Instant;

use serde::Serialize;

pub const BOUNCE_DETECTED: &str = "bounce-detected";
pub const DEBUG_SAMPLES: &str = "debug-samples";

/// Milliseconds on the process-local monotonic clock.
///
/// The box may NTP-step its wall clock shortly after boot, so events carry
/// a tick counter instead: near zero at startup, never going backwards.
pub fn ticks_ms() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
}

/// One detected bounce, reported per threshold crossing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BounceEvent {
    #[serde(rename = "type")]
    kind: &'static str,
    pub timestamp: u64,
    pub bounce_ctr: u64,
}

impl BounceEvent {
    pub fn new(bounce_ctr: u64) -> Self {
        Self {
            kind: BOUNCE_DETECTED,
            timestamp: ticks_ms(),
            bounce_ctr,
        }
    }
}

/// One analyzed capture window, shipped when sample streaming is on.
#[derive(Debug, Clone, Serialize)]
pub struct DebugSamplesEvent {
    #[serde(rename = "type")]
    kind: &'static str,
    pub timestamp: u64,
    pub samples: Vec<i16>,
    pub is_bounce: bool,
    pub bounce_ctr: u64,
    pub sample_rate: u32,
}

impl DebugSamplesEvent {
    pub fn new(samples: Vec<i16>, is_bounce: bool, bounce_ctr: u64, sample_rate: u32) -> Self {
        Self {
            kind: DEBUG_SAMPLES,
            timestamp: ticks_ms(),
            samples,
            is_bounce,
            bounce_ctr,
            sample_rate,
        }
    }
}
