//! Window-level bounce detection: filtering, adaptive thresholding and
//! event numbering.

use crate::config::DetectorConfig;
use crate::dsp::filter::{self, FilterError, FilterKind, SosChain};
use crate::dsp::threshold::{AdaptiveThreshold, Observation};
use crate::events::BounceEvent;

/// Fixed order of the high-pass that conditions the capture stream.
pub const FILTER_ORDER: usize = 4;

/// Turns raw capture windows into numbered bounce events.
pub struct BounceDetector {
    chain: SosChain,
    threshold: AdaptiveThreshold,
    bounce_ctr: u64,
    scratch: Vec<f32>,
}

impl BounceDetector {
    pub fn new(cfg: &DetectorConfig, sample_rate: u32) -> Result<Self, FilterError> {
        let sections = filter::design(
            FILTER_ORDER,
            cfg.highpass_filter_cutoff_freq,
            sample_rate as f64,
            FilterKind::Highpass,
        )?;
        Ok(Self {
            chain: SosChain::new(&sections),
            threshold: AdaptiveThreshold::new(
                cfg.rolling_max_seed,
                cfg.rolling_max_short_decay_factor,
                cfg.rolling_max_long_decay_factor,
                cfg.bounce_threshold,
                cfg.peak_policy,
            ),
            bounce_ctr: 0,
            scratch: Vec::new(),
        })
    }

    /// Run one capture window through the chain and classify it. Every
    /// flagged window yields an event carrying the next counter value.
    pub fn process_window(&mut self, samples: &[i16]) -> (Observation, Option<BounceEvent>) {
        self.scratch.clear();
        self.scratch.extend(samples.iter().map(|&s| s as f32));
        self.chain.process(&mut self.scratch);

        let observation = self.threshold.observe(&self.scratch);
        let event = if observation.is_bounce {
            self.bounce_ctr += 1;
            log::info!(
                "bounce #{} (peak {:.0}, signal {:.2})",
                self.bounce_ctr,
                observation.peak,
                observation.signal
            );
            Some(BounceEvent::new(self.bounce_ctr))
        } else {
            None
        };
        (observation, event)
    }

    pub fn bounce_count(&self) -> u64 {
        self.bounce_ctr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;
    const WINDOW: usize = 64;

    /// A short burst in the middle of the window, zero on both edges so
    /// the filter settles before the next window starts.
    fn loud_window() -> Vec<i16> {
        let mut w = vec![0i16; WINDOW];
        for (i, s) in w[8..16].iter_mut().enumerate() {
            *s = if i % 2 == 0 { 8000 } else { -8000 };
        }
        w
    }

    fn detector() -> BounceDetector {
        BounceDetector::new(&DetectorConfig::default(), RATE).unwrap()
    }

    #[test]
    fn silence_yields_no_events() {
        let mut det = detector();
        for _ in 0..50 {
            let (obs, event) = det.process_window(&vec![0i16; WINDOW]);
            assert!(!obs.is_bounce);
            assert!(event.is_none());
        }
        assert_eq!(det.bounce_count(), 0);
    }

    #[test]
    fn burst_raises_exactly_one_event() {
        let mut det = detector();
        let (obs, event) = det.process_window(&loud_window());
        assert!(obs.is_bounce);
        let event = event.unwrap();
        assert_eq!(event.bounce_ctr, 1);

        // The ring-down after the burst is not a second bounce.
        for _ in 0..3 {
            let (_, event) = det.process_window(&vec![0i16; WINDOW]);
            assert!(event.is_none());
        }
    }

    #[test]
    fn counter_increments_by_one_per_bounce() {
        let mut det = detector();
        let quiet = vec![0i16; WINDOW];
        let mut counts = Vec::new();
        for _ in 0..3 {
            let (_, event) = det.process_window(&loud_window());
            counts.push(event.expect("burst must fire").bounce_ctr);
            for _ in 0..3 {
                det.process_window(&quiet);
            }
        }
        assert_eq!(counts, vec![1, 2, 3]);
        assert_eq!(det.bounce_count(), 3);
    }

    #[test]
    fn bad_cutoff_fails_construction() {
        let cfg = DetectorConfig {
            highpass_filter_cutoff_freq: 20_000.0,
            ..DetectorConfig::default()
        };
        assert!(BounceDetector::new(&cfg, RATE).is_err());
    }
}
