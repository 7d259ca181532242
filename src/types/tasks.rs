use super::RepEvent;

/// Store task enumeration for the background recorder thread.
#[derive(Clone)]
pub enum RecorderTask {
    BeginSession {
        session_id: String,
        source: String,
        started_at_ms: i64,
    },
    RecordRep {
        session_id: String,
        set_index: u32,
        event: RepEvent,
    },
    RecordSetBoundary {
        session_id: String,
        set_index: u32,
        rep_count: u32,
        at_ms: i64,
    },
    /// Attach the auto-detected exercise label to a running session.
    LabelSession {
        session_id: String,
        exercise: String,
    },
    FinishSession {
        session_id: String,
        finished_at_ms: i64,
        rep_count: u32,
    },
    GetSessionSummaries {
        limit: usize,
        response_sender: crossbeam_channel::Sender<Vec<SessionSummary>>,
    },
    GetSessionReps {
        session_id: String,
        response_sender: crossbeam_channel::Sender<Vec<RepEvent>>,
    },
}

/// One row of workout history, as read back from the store.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub source: String,
    pub exercise: Option<String>,
    pub started_at_ms: i64,
    pub finished_at_ms: Option<i64>,
    pub rep_count: u32,
    pub set_count: u32,
}
