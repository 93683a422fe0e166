//! Wire format of device-reported events.

use serde::Deserialize;
use serde_json::Value;

pub const BOUNCE_DETECTED: &str = "bounce-detected";
pub const DEBUG_SAMPLES: &str = "debug-samples";

/// Envelope every device POST arrives in: `{"event": {...}}`.
#[derive(Debug, Deserialize)]
pub struct EventEnvelope {
    pub event: Value,
}

/// Payload of a `bounce-detected` event.
#[derive(Debug, Clone, Deserialize)]
pub struct BounceReport {
    /// Milliseconds on the device's monotonic clock.
    pub timestamp: u64,
    /// Strictly increasing per-device bounce counter.
    pub bounce_ctr: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_unwraps_the_event() {
        let envelope: EventEnvelope = serde_json::from_str(
            r#"{"event": {"type": "bounce-detected", "timestamp": 123, "bounce_ctr": 1}}"#,
        )
        .unwrap();
        assert_eq!(envelope.event["type"], "bounce-detected");
    }

    #[test]
    fn bounce_report_ignores_the_discriminator() {
        let report: BounceReport = serde_json::from_value(serde_json::json!({
            "type": "bounce-detected",
            "timestamp": 4242,
            "bounce_ctr": 17
        }))
        .unwrap();
        assert_eq!(report.timestamp, 4242);
        assert_eq!(report.bounce_ctr, 17);
    }

    #[test]
    fn bounce_report_requires_its_fields() {
        let result: Result<BounceReport, _> =
            serde_json::from_value(serde_json::json!({ "type": "bounce-detected" }));
        assert!(result.is_err());
    }
}
