//! Adaptive peak thresholding over filtered windows.

use serde::Deserialize;

/// How the per-window peak amplitude is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeakPolicy {
    /// Largest absolute sample value.
    Abs,
    /// Largest signed sample value.
    Max,
}

/// Exponentially decayed running maximum of window peaks.
#[derive(Debug, Clone)]
pub struct RollingMax {
    value: f32,
    decay: f32,
}

impl RollingMax {
    pub fn new(seed: f32, decay: f32) -> Self {
        Self { value: seed, decay }
    }

    /// Fold one window peak into the estimate and return the new value.
    pub fn update(&mut self, peak: f32) -> f32 {
        self.value = self.decay * self.value + (1.0 - self.decay) * peak;
        self.value
    }
}

/// What the detector learned from one window.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub peak: f32,
    pub signal: f32,
    pub is_bounce: bool,
}

/// Flags windows whose peak sticks out of the recent envelope.
///
/// Two rolling maxima follow the peak at a fast and a slow horizon. The
/// deviation of the current peak from the fast estimate, normalized by the
/// slow one, is the bounce signal. Both maxima keep adapting through loud
/// and quiet stretches alike, so the detector follows slow changes in the
/// room's noise floor without ever being reset.
#[derive(Debug)]
pub struct AdaptiveThreshold {
    short: RollingMax,
    long: RollingMax,
    threshold: f32,
    policy: PeakPolicy,
}

impl AdaptiveThreshold {
    pub fn new(
        seed: f32,
        short_decay: f32,
        long_decay: f32,
        threshold: f32,
        policy: PeakPolicy,
    ) -> Self {
        Self {
            short: RollingMax::new(seed, short_decay),
            long: RollingMax::new(seed, long_decay),
            threshold,
            policy,
        }
    }

    /// Classify one filtered window. Both maxima are updated with the
    /// window's peak before the signal is derived from them.
    pub fn observe(&mut self, window: &[f32]) -> Observation {
        let peak = match self.policy {
            PeakPolicy::Abs => window.iter().fold(0.0f32, |m, &x| m.max(x.abs())),
            PeakPolicy::Max => window.iter().fold(f32::NEG_INFINITY, |m, &x| m.max(x)),
        };
        let short = self.short.update(peak);
        let long = self.long.update(peak);
        let signal = (peak - short) / long;
        Observation {
            peak,
            signal,
            is_bounce: signal > self.threshold,
        }
    }
}
