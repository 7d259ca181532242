use std::collections::VecDeque;

use crate::types::{MovementPhase, PaceSignal};

/// Rep intervals kept for the rolling tempo mean.
const INTERVAL_HISTORY: usize = 5;

/// Slow EMA weight for the activity baseline.
const BASELINE_ALPHA: f64 = 0.02;

/// Smoothed magnitude must leave the baseline by this much to count as
/// active motion.
const ACTIVITY_THRESHOLD: f64 = 0.25;

/// Tempo feedback derived from rep timing and the live smoothed signal.
///
/// Deviation compares the interval forming since the last rep against the
/// rolling mean of recent completed intervals: positive means the current
/// rep is running slow, negative means fast. Clamped to [-1, 1].
pub struct PaceTracker {
    intervals_ms: VecDeque<u64>,
    last_rep_at_ms: Option<i64>,
    baseline: Option<f64>,
}

impl PaceTracker {
    pub fn new() -> Self {
        Self {
            intervals_ms: VecDeque::with_capacity(INTERVAL_HISTORY),
            last_rep_at_ms: None,
            baseline: None,
        }
    }

    /// Records a confirmed rep and its measured duration.
    pub fn on_rep(&mut self, at_ms: i64, duration_ms: u64) {
        self.last_rep_at_ms = Some(at_ms);
        if self.intervals_ms.len() == INTERVAL_HISTORY {
            self.intervals_ms.pop_front();
        }
        self.intervals_ms.push_back(duration_ms);
    }

    /// Produces the pace signal for one sample of the smoothed stream.
    pub fn on_sample(&mut self, smoothed: f64, ascending: bool, now_ms: i64) -> PaceSignal {
        let baseline = match self.baseline {
            None => {
                self.baseline = Some(smoothed);
                smoothed
            }
            Some(b) => {
                let next = b * (1.0 - BASELINE_ALPHA) + smoothed * BASELINE_ALPHA;
                self.baseline = Some(next);
                next
            }
        };

        let deviation = match (self.last_rep_at_ms, self.mean_interval_ms()) {
            (Some(last), Some(mean)) if mean > 0.0 => {
                let forming = (now_ms - last).max(0) as f64;
                ((forming - mean) / mean).clamp(-1.0, 1.0)
            }
            _ => 0.0,
        };

        PaceSignal {
            deviation,
            phase: if ascending {
                MovementPhase::Concentric
            } else {
                MovementPhase::Eccentric
            },
            active: (smoothed - baseline).abs() > ACTIVITY_THRESHOLD,
        }
    }

    fn mean_interval_ms(&self) -> Option<f64> {
        if self.intervals_ms.is_empty() {
            return None;
        }
        let sum: u64 = self.intervals_ms.iter().sum();
        Some(sum as f64 / self.intervals_ms.len() as f64)
    }

    pub fn reset(&mut self) {
        self.intervals_ms.clear();
        self.last_rep_at_ms = None;
        self.baseline = None;
    }
}

impl Default for PaceTracker {
    fn default() -> Self {
        Self::new()
    }
}
