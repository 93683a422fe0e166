//! Optional WAV recording of the raw capture stream.

use std::fs::File;
use std::io::BufWriter;

use hound::{SampleFormat, WavSpec, WavWriter};

/// Appends capture windows to a mono 16-bit WAV file.
///
/// This is a debugging aid. Any failure downgrades the tap to a no-op
/// instead of taking down capture.
pub struct WavTap {
    writer: Option<WavWriter<BufWriter<File>>>,
}

impl WavTap {
    pub fn open(path: Option<&str>, sample_rate: u32) -> Self {
        let writer = path.and_then(|p| {
            let spec = WavSpec {
                channels: 1,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            };
            match WavWriter::create(p, spec) {
                Ok(w) => {
                    log::info!("recording capture to {}", p);
                    Some(w)
                }
                Err(e) => {
                    log::warn!("cannot create WAV file {}: {}", p, e);
                    None
                }
            }
        });
        Self { writer }
    }

    pub fn write(&mut self, window: &[i16]) {
        let mut failed = false;
        if let Some(writer) = self.writer.as_mut() {
            for &sample in window {
                if let Err(e) = writer.write_sample(sample) {
                    log::warn!("WAV write failed, disabling recording: {}", e);
                    failed = true;
                    break;
                }
            }
        }
        if failed {
            self.writer = None;
        }
    }

    /// Flush the header so the file is playable. Called once when capture
    /// winds down; writes after this are no-ops.
    pub fn finalize(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                log::warn!("failed to finalize WAV file: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("pingpong-{}-{}.wav", name, std::process::id()))
    }

    #[test]
    fn disabled_tap_is_a_noop() {
        let mut tap = WavTap::open(None, 16_000);
        tap.write(&[1, 2, 3]);
        tap.finalize();
    }

    #[test]
    fn windows_end_up_in_the_file() {
        let path = temp_path("windows");
        let mut tap = WavTap::open(path.to_str(), 16_000);
        tap.write(&[0, 1000, -1000, 32767]);
        tap.write(&[5, 6]);
        tap.finalize();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 16_000);
        let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(samples, vec![0, 1000, -1000, 32767, 5, 6]);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn unwritable_path_degrades_to_noop() {
        let mut tap = WavTap::open(Some("/nonexistent-dir/out.wav"), 16_000);
        tap.write(&[1, 2, 3]);
        tap.finalize();
    }
}
