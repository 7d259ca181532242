use std::time::Instant;

use chrono::Utc;

/// Session time base: anchored to wall time once at session start, advanced
/// by a monotonic `Instant` from there. Cooldowns and rest timers measured
/// on this clock cannot double-count reps across a wall-clock adjustment.
#[derive(Debug, Clone)]
pub struct SessionClock {
    started: Instant,
    anchor_ms: i64,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            anchor_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Current session time in epoch milliseconds.
    pub fn now_ms(&self) -> i64 {
        self.anchor_ms + self.started.elapsed().as_millis() as i64
    }

    /// The anchor taken at session start.
    pub fn session_start_ms(&self) -> i64 {
        self.anchor_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_never_runs_backwards() {
        let clock = SessionClock::start();
        let mut last = clock.now_ms();
        for _ in 0..1000 {
            let now = clock.now_ms();
            assert!(now >= last);
            last = now;
        }
        assert!(last >= clock.session_start_ms());
    }
}
