pub mod protocol;
pub mod remote;
pub mod simulated;

use std::time::Duration;

use crate::types::RawReading;

pub use remote::RemoteSource;
pub use simulated::SimulatedSource;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("source disconnected")]
    Disconnected,
}

/// Everything a source can hand the session engine.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceEvent {
    /// One raw 3-axis reading.
    Sample(RawReading),
    /// Handshake acknowledged; the link is live.
    Connected,
    /// Rep confirmed by a remote detector; bypasses the local pipeline.
    Rep { amplitude: f64 },
    /// Heartbeat; functionally ignored.
    Heartbeat { sample_idx: u64 },
    /// Remote acknowledged a pipeline reset.
    ResetAck,
    /// Remote auto-detect answered.
    ExerciseDetected { exercise: String, rep_count: u32 },
    /// Remote started collecting for auto-detect.
    AutoDetectStarted,
    /// Nothing arrived within the poll timeout.
    Idle,
    /// The source closed the stream; no further events will arrive.
    Closed,
}

/// Uniform "next event" interface over the simulated generator, a local
/// sensor stream, or a remote detector. The rep detector and feature
/// extractor only ever see this trait.
pub trait SampleSource: Send {
    fn name(&self) -> &'static str;

    /// Waits up to `timeout` for the next event. Returns `Idle` on timeout.
    fn poll(&mut self, timeout: Duration) -> Result<SourceEvent, SourceError>;

    /// Asks the source to start an auto-detect pass. Sources without a
    /// remote detector acknowledge and leave collection to the caller.
    fn request_auto_detect(&mut self) -> Result<(), SourceError>;

    /// Asks the source to reset its own detection state, if it has any.
    fn request_reset(&mut self) -> Result<(), SourceError>;

    fn disconnect(&mut self);

    /// True when reps arrive pre-detected as `SourceEvent::Rep` and the
    /// local smoother/detector must not run.
    fn detects_reps_remotely(&self) -> bool {
        false
    }
}
