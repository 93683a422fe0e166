//! Capture pipeline: a dedicated OS thread reads windows from ALSA and runs
//! the bounce detector; detected events reach the async side over bounded
//! channels.
//!
//! Audio runs on std::thread (NOT a tokio task) so real-time reads never
//! contend with network I/O. Everything downstream goes through `try_send`;
//! a slow or stalled consumer drops payloads but can never hold up sampling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::thread::{self, JoinHandle};

use anyhow::Result;
use thiserror::Error;
use tokio::sync::mpsc;

use super::alsa_device;
use crate::config::DeviceConfig;
use crate::detector::BounceDetector;
use crate::events::{BounceEvent, DebugSamplesEvent};
use crate::wav::WavTap;

const EVENT_QUEUE: usize = 32;
const DEBUG_QUEUE: usize = 8;

/// Terminal capture failures, surfaced through [`CapturePipeline::next_event`].
#[derive(Debug, Clone, Error)]
pub enum DetectorError {
    /// The pipeline never got off the ground (device missing, bad filter).
    #[error("failed to start capture: {0}")]
    Startup(String),
    /// The retry budget for capture anomalies ran out. The pipeline is dead
    /// and has to be rebuilt to resume detection.
    #[error("hardware read failed after {attempts} consecutive anomalies: {message}")]
    HardwareRead { attempts: u32, message: String },
    /// Capture wound down without a recorded failure (normal shutdown).
    #[error("capture stopped")]
    Stopped,
}

/// Owns the capture thread and the bounce event stream.
pub struct CapturePipeline {
    running: Arc<AtomicBool>,
    events: mpsc::Receiver<BounceEvent>,
    failure: Arc<OnceLock<DetectorError>>,
    handle: Option<JoinHandle<()>>,
}

impl CapturePipeline {
    /// Spawn the capture thread. The returned receiver carries analyzed
    /// windows when `debug.stream_samples` is on and stays silent otherwise.
    pub fn start(cfg: &DeviceConfig) -> Result<(Self, mpsc::Receiver<DebugSamplesEvent>)> {
        let running = Arc::new(AtomicBool::new(true));
        let failure = Arc::new(OnceLock::new());
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let (debug_tx, debug_rx) = mpsc::channel(DEBUG_QUEUE);

        let handle = {
            let running = running.clone();
            let failure = failure.clone();
            let cfg = cfg.clone();
            thread::Builder::new()
                .name("bounce-capture".into())
                .spawn(move || {
                    // The senders stay owned here: the failure must be
                    // parked before they drop and close the channel, or a
                    // racing next_event() sees a plain stop instead.
                    if let Err(e) = capture_thread(&cfg, &event_tx, &debug_tx, &running) {
                        log::error!("Capture thread error: {}", e);
                        let _ = failure.set(e);
                    }
                })?
        };

        Ok((
            Self {
                running,
                events: event_rx,
                failure,
                handle: Some(handle),
            },
            debug_rx,
        ))
    }

    /// Wait for the next detected bounce.
    ///
    /// Returns `Err` once the capture thread has died; the pipeline cannot
    /// be resumed afterwards.
    pub async fn next_event(&mut self) -> Result<BounceEvent, DetectorError> {
        match self.events.recv().await {
            Some(event) => Ok(event),
            None => Err(self
                .failure
                .get()
                .cloned()
                .unwrap_or(DetectorError::Stopped)),
        }
    }

    /// Signal the capture thread to stop and wait for it to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

// ======================== Capture thread ========================

/// Consecutive-anomaly budget for the read loop. Capture gives up once an
/// unbroken run of anomalies reaches the configured length.
struct RetryBudget {
    max: u32,
    seen: u32,
}

impl RetryBudget {
    fn new(max: u32) -> Self {
        Self { max, seen: 0 }
    }

    fn anomaly(&mut self) {
        self.seen += 1;
    }

    fn success(&mut self) {
        self.seen = 0;
    }

    fn exhausted(&self) -> bool {
        self.seen >= self.max
    }
}

fn capture_thread(
    cfg: &DeviceConfig,
    event_tx: &mpsc::Sender<BounceEvent>,
    debug_tx: &mpsc::Sender<DebugSamplesEvent>,
    running: &AtomicBool,
) -> Result<(), DetectorError> {
    // 1. Open ALSA capture device
    let window = cfg.audio.window_size_samples();
    let (pcm, params) =
        alsa_device::open_capture(&cfg.audio.device, cfg.audio.sample_rate, window)
            .map_err(|e| DetectorError::Startup(format!("{e:#}")))?;

    let actual_rate = params.sample_rate;
    if actual_rate != cfg.audio.sample_rate {
        log::warn!(
            "hardware negotiated {} Hz instead of {} Hz",
            actual_rate,
            cfg.audio.sample_rate
        );
    }
    if params.period_size != window {
        // Blocking reads still return full windows; this only costs latency.
        log::warn!(
            "hardware period is {} frames, analysis window is {}",
            params.period_size,
            window
        );
    }

    // 2. Build the detector against the negotiated rate
    let mut detector = BounceDetector::new(&cfg.detector, actual_rate)
        .map_err(|e| DetectorError::Startup(e.to_string()))?;

    // 3. Optional raw recording of everything the microphone hears
    let mut wav = WavTap::open(cfg.debug.wav_path.as_deref(), actual_rate);

    // ALSA read buffer, one analysis window
    let mut read_buf = vec![0i16; window];

    let io = pcm
        .io_i16()
        .map_err(|e| DetectorError::Startup(e.to_string()))?;

    let mut budget = RetryBudget::new(cfg.detector.max_read_failures);

    log::info!(
        "Capture started: rate={}, window={} samples ({} ms)",
        actual_rate,
        window,
        cfg.audio.window_size_ms,
    );

    while running.load(Ordering::Relaxed) {
        // Read one window from ALSA
        match io.readi(&mut read_buf) {
            Ok(frames) if frames == window => {
                budget.success();
                wav.write(&read_buf);

                let (observation, event) = detector.process_window(&read_buf);
                if let Some(event) = event {
                    // Never block on the network side; drop instead.
                    if let Err(e) = event_tx.try_send(event) {
                        log::warn!(
                            "event queue full, dropping bounce #{}",
                            e.into_inner().bounce_ctr
                        );
                    }
                }
                if cfg.debug.stream_samples {
                    let payload = DebugSamplesEvent::new(
                        read_buf.clone(),
                        observation.is_bounce,
                        detector.bounce_count(),
                        actual_rate,
                    );
                    if debug_tx.try_send(payload).is_err() {
                        log::debug!("debug queue full, dropping window");
                    }
                }
            }
            Ok(frames) => {
                // Short read, drop the partial window and read again.
                budget.anomaly();
                log::warn!(
                    "expected {} samples, got {} ({}/{})",
                    window,
                    frames,
                    budget.seen,
                    budget.max,
                );
            }
            Err(e) => {
                budget.anomaly();
                log::warn!(
                    "ALSA capture error: {}, recovering... ({}/{})",
                    e,
                    budget.seen,
                    budget.max,
                );
                if let Err(e2) = pcm.prepare() {
                    wav.finalize();
                    return Err(DetectorError::HardwareRead {
                        attempts: budget.seen,
                        message: format!("recovery failed: {e2}"),
                    });
                }
            }
        }

        if budget.exhausted() {
            wav.finalize();
            return Err(DetectorError::HardwareRead {
                attempts: budget.seen,
                message: "retry budget exhausted".to_string(),
            });
        }
    }

    wav.finalize();
    log::info!("Capture stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A pipeline whose capture thread is already gone: channel closed,
    /// failure slot optionally filled.
    fn dead_pipeline(failure: Option<DetectorError>) -> CapturePipeline {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        let slot = Arc::new(OnceLock::new());
        if let Some(e) = failure {
            slot.set(e).unwrap();
        }
        CapturePipeline {
            running: Arc::new(AtomicBool::new(false)),
            events: rx,
            failure: slot,
            handle: None,
        }
    }

    #[tokio::test]
    async fn hardware_death_is_reported_on_every_poll() {
        let mut pipeline = dead_pipeline(Some(DetectorError::HardwareRead {
            attempts: 10,
            message: "retry budget exhausted".to_string(),
        }));
        for _ in 0..2 {
            let err = pipeline.next_event().await.unwrap_err();
            assert!(matches!(
                err,
                DetectorError::HardwareRead { attempts: 10, .. }
            ));
        }
    }

    #[tokio::test]
    async fn clean_shutdown_reports_a_plain_stop() {
        let mut pipeline = dead_pipeline(None);
        assert!(matches!(
            pipeline.next_event().await.unwrap_err(),
            DetectorError::Stopped
        ));
    }

    #[test]
    fn budget_exhausts_when_the_run_reaches_the_limit() {
        let mut budget = RetryBudget::new(3);
        budget.anomaly();
        budget.anomaly();
        assert!(!budget.exhausted());
        budget.anomaly();
        assert!(budget.exhausted());
    }

    #[test]
    fn a_full_read_resets_the_run() {
        let mut budget = RetryBudget::new(2);
        budget.anomaly();
        budget.success();
        budget.anomaly();
        assert!(!budget.exhausted());
        budget.anomaly();
        assert!(budget.exhausted());
    }
}
