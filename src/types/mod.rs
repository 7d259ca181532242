pub mod events;
pub mod rep_event;
pub mod sample;
pub mod tasks;

pub use events::{AutoDetectOutcome, AutoDetectResult, MovementPhase, PaceSignal, SessionEvent};
pub use rep_event::RepEvent;
pub use sample::{RawReading, Sample};
pub use tasks::{RecorderTask, SessionSummary};
