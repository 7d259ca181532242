use log::{debug, warn};

use crate::types::{RawReading, Sample};

/// How often the running drop count is reported.
const DROP_LOG_INTERVAL: u64 = 100;

/// Validates raw readings and turns them into normalized samples.
///
/// Malformed input (non-finite axes, magnitudes beyond the configured bound)
/// is dropped and counted, never propagated. Timestamps are filled from the
/// session clock when the source does not provide them, and clamped so they
/// never run backwards within a session.
pub struct SampleNormalizer {
    max_magnitude: f64,
    last_timestamp_ms: Option<i64>,
    dropped: u64,
    clamped: u64,
}

impl SampleNormalizer {
    pub fn new(max_magnitude: f64) -> Self {
        Self {
            max_magnitude,
            last_timestamp_ms: None,
            dropped: 0,
            clamped: 0,
        }
    }

    /// Normalizes one reading. Returns `None` for input that must not reach
    /// the pipeline.
    pub fn ingest(&mut self, raw: RawReading, fallback_timestamp_ms: i64) -> Option<Sample> {
        if !(raw.x.is_finite() && raw.y.is_finite() && raw.z.is_finite()) {
            self.note_drop("non-finite axis value");
            return None;
        }

        let mut timestamp_ms = raw.timestamp.unwrap_or(fallback_timestamp_ms);
        if let Some(last) = self.last_timestamp_ms {
            if timestamp_ms < last {
                // Clock skew from the source; clamp instead of reordering.
                timestamp_ms = last;
                self.clamped += 1;
                debug!("ingest: clamped backwards timestamp ({} total)", self.clamped);
            }
        }

        let sample = Sample::new(raw.x, raw.y, raw.z, timestamp_ms);
        if sample.magnitude > self.max_magnitude {
            self.note_drop("magnitude out of range");
            return None;
        }

        self.last_timestamp_ms = Some(timestamp_ms);
        Some(sample)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn reset(&mut self) {
        self.last_timestamp_ms = None;
        self.dropped = 0;
        self.clamped = 0;
    }

    fn note_drop(&mut self, reason: &str) {
        self.dropped += 1;
        if self.dropped == 1 || self.dropped % DROP_LOG_INTERVAL == 0 {
            warn!("ingest: dropped sample ({}), {} dropped so far", reason, self.dropped);
        }
    }
}
