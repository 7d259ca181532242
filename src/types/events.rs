/// Movement phase derived from the smoothed-signal trend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MovementPhase {
    Concentric,
    Eccentric,
}

impl MovementPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementPhase::Concentric => "concentric",
            MovementPhase::Eccentric => "eccentric",
        }
    }
}

/// Tempo feedback emitted alongside the rep stream: how far the forming rep
/// interval deviates from the rolling mean of recent intervals.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaceSignal {
    pub deviation: f64,
    pub phase: MovementPhase,
    pub active: bool,
}

/// Set boundaries and rest warnings raised by the rest monitor.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    SetCompleted {
        set_index: u32,
        rep_count: u32,
        at_ms: i64,
    },
    RestWarning {
        idle_ms: u64,
        at_ms: i64,
    },
    RestWarningCleared {
        at_ms: i64,
    },
}

/// Outcome of one auto-detect pass. Every requested pass resolves to
/// exactly one of these; aborted passes answer too, never silence.
#[derive(Clone, Debug, PartialEq)]
pub enum AutoDetectOutcome {
    Exercise { label: String, confidence: f64 },
    /// Best guess fell below the configured confidence floor; no label is
    /// promoted.
    Undetermined { best_guess: String, confidence: f64 },
    /// The pass aborted before a verdict (window starved, stream closed,
    /// or the collected window could not be classified).
    Failed { reason: String },
}

impl AutoDetectOutcome {
    /// The promoted label, when the pass produced one.
    pub fn label(&self) -> Option<&str> {
        match self {
            AutoDetectOutcome::Exercise { label, .. } => Some(label),
            AutoDetectOutcome::Undetermined { .. } | AutoDetectOutcome::Failed { .. } => None,
        }
    }
}

/// Result of an auto-detect request, paired with the live rep count at the
/// moment the window resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct AutoDetectResult {
    pub outcome: AutoDetectOutcome,
    pub rep_count_at_detection: u32,
}
