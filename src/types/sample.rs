/// Raw 3-axis reading as delivered by a sample source, before validation.
/// Integer and float encodings both land here (serde parses either into f64).
#[derive(serde::Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct RawReading {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl RawReading {
    pub fn new(x: f64, y: f64, z: f64, timestamp: Option<i64>) -> Self {
        Self { x, y, z, timestamp }
    }
}

/// Normalized sample produced by ingest: validated axes, Euclidean magnitude,
/// and a session-clock timestamp in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub magnitude: f64,
    pub timestamp_ms: i64,
}

impl Sample {
    pub fn new(x: f64, y: f64, z: f64, timestamp_ms: i64) -> Self {
        let magnitude = (x * x + y * y + z * z).sqrt();
        Self {
            x,
            y,
            z,
            magnitude,
            timestamp_ms,
        }
    }
}
