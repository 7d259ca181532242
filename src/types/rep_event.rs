/// One confirmed repetition. Created exactly once per rep and never mutated.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RepEvent {
    /// Session-clock time of the confirming sample, in milliseconds.
    pub timestamp_ms: i64,
    /// Smoothed magnitude at the peak that produced this rep.
    pub peak_acceleration: f64,
    /// Time since the previous confirmed rep (session start for the first).
    pub duration_ms: u64,
    /// Peak scaled by the calibrated intensity scale, clamped to [0, 1].
    pub intensity: f64,
}

impl RepEvent {
    pub fn new(timestamp_ms: i64, peak_acceleration: f64, duration_ms: u64, intensity: f64) -> Self {
        Self {
            timestamp_ms,
            peak_acceleration,
            duration_ms,
            intensity: intensity.clamp(0.0, 1.0),
        }
    }
}
