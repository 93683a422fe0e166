//! Microphone capture: ALSA device handling and the real-time read loop.

pub mod alsa_device;
pub mod capture;

pub use capture::{CapturePipeline, DetectorError};
