//! Butterworth filter design and second-order-section cascades.
//!
//! Coefficients are designed once at startup in f64 via the bilinear
//! transform of the analog Butterworth prototype, then applied per window as
//! an f32 cascade. Section state persists across windows so the cascade runs
//! continuously over the capture stream.

use std::f64::consts::PI;

use thiserror::Error;

/// Filter response type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
}

/// Design-time failures. These are configuration mistakes and fatal at
/// startup.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid filter parameter: {0}")]
    InvalidParameter(String),
}

/// One second-order section with the denominator normalized to `a0 = 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sos {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

/// Design an even-order Butterworth filter as cascaded second-order
/// sections.
///
/// The analog prototype's conjugate pole pairs sit at angles
/// `phi_k = pi/2 + (2k-1)*pi/(2N)`; each pair contributes the quadratic
/// `s^2 - 2*wc*cos(phi_k)*s + wc^2`, which is mapped to the z-domain with
/// the bilinear substitution `s = c*(1 - z^-1)/(1 + z^-1)`, `c = 2*fs`. The
/// cutoff is prewarped so the digital -3 dB point lands exactly on
/// `cutoff_hz`.
pub fn design(
    order: usize,
    cutoff_hz: f64,
    sample_rate_hz: f64,
    kind: FilterKind,
) -> Result<Vec<Sos>, FilterError> {
    if order == 0 || order % 2 != 0 {
        return Err(FilterError::InvalidParameter(format!(
            "order must be a positive even number, got {order}"
        )));
    }
    let nyquist = sample_rate_hz / 2.0;
    if !(cutoff_hz > 0.0 && cutoff_hz < nyquist) {
        return Err(FilterError::InvalidParameter(format!(
            "cutoff {cutoff_hz} Hz is outside (0, {nyquist}) Hz"
        )));
    }

    let wc = 2.0 * sample_rate_hz * (PI * cutoff_hz / sample_rate_hz).tan();
    let c = 2.0 * sample_rate_hz;

    let pairs = order / 2;
    let mut sections = Vec::with_capacity(pairs);
    for k in 1..=pairs {
        let phi = PI / 2.0 + (2 * k - 1) as f64 * PI / (2 * order) as f64;
        // Analog denominator s^2 + q1*s + q0 for this pole pair.
        let q1 = -2.0 * wc * phi.cos();
        let q0 = wc * wc;

        // Bilinear transform, multiplied through by (1 + z^-1)^2.
        let a0 = c * c + q1 * c + q0;
        let a1 = 2.0 * (q0 - c * c);
        let a2 = c * c - q1 * c + q0;

        // Lowpass keeps the analog numerator wc^2, highpass keeps s^2.
        let (b0, b1, b2) = match kind {
            FilterKind::Lowpass => (q0, 2.0 * q0, q0),
            FilterKind::Highpass => (c * c, -2.0 * c * c, c * c),
        };

        sections.push(Sos {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        });
    }
    Ok(sections)
}

/// Runtime state of one section, transposed Direct Form II.
#[derive(Debug, Clone)]
struct Stage {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Stage {
    #[inline]
    fn tick(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

/// A cascade of second-order sections with persistent state.
#[derive(Debug, Clone)]
pub struct SosChain {
    stages: Vec<Stage>,
}

impl SosChain {
    pub fn new(sections: &[Sos]) -> Self {
        let stages = sections
            .iter()
            .map(|s| Stage {
                b0: s.b0 as f32,
                b1: s.b1 as f32,
                b2: s.b2 as f32,
                a1: s.a1 as f32,
                a2: s.a2 as f32,
                z1: 0.0,
                z2: 0.0,
            })
            .collect();
        Self { stages }
    }

    /// Filter one window in place.
    pub fn process(&mut self, samples: &mut [f32]) {
        for stage in &mut self.stages {
            for x in samples.iter_mut() {
                *x = stage.tick(*x);
            }
        }
    }
}
