use log::info;

use crate::types::SessionEvent;

#[derive(Debug, Clone)]
pub struct RestMonitorConfig {
    /// Idle time after the last rep that closes the current set.
    pub set_completion_ms: u64,
    /// Idle time after the last activity that raises a rest warning.
    pub max_rest_ms: u64,
    /// How long a rest warning stays active before it clears on its own.
    pub warning_display_ms: u64,
}

impl Default for RestMonitorConfig {
    fn default() -> Self {
        Self {
            set_completion_ms: 10_000,
            max_rest_ms: 120_000,
            warning_display_ms: 4_000,
        }
    }
}

/// Declares set boundaries and rest warnings from rep timing alone.
///
/// Evaluated on a periodic tick. The set-completion and rest-warning rules
/// each fire at most once per idle period; a new rep re-arms both.
pub struct RestMonitor {
    config: RestMonitorConfig,
    session_start_ms: i64,
    last_rep_at_ms: Option<i64>,
    reps_in_set: u32,
    set_index: u32,
    last_set_completed_at_ms: Option<i64>,
    rest_warned: bool,
    warning_active_since_ms: Option<i64>,
}

impl RestMonitor {
    pub fn new(config: RestMonitorConfig, session_start_ms: i64) -> Self {
        Self {
            config,
            session_start_ms,
            last_rep_at_ms: None,
            reps_in_set: 0,
            set_index: 0,
            last_set_completed_at_ms: None,
            rest_warned: false,
            warning_active_since_ms: None,
        }
    }

    /// Index of the set the next rep belongs to.
    pub fn set_index(&self) -> u32 {
        self.set_index
    }

    /// Records a confirmed rep. Re-arms both idle rules; clears an active
    /// rest warning immediately.
    pub fn on_rep(&mut self, at_ms: i64) -> Option<SessionEvent> {
        self.last_rep_at_ms = Some(at_ms);
        self.reps_in_set += 1;
        self.rest_warned = false;
        if self.warning_active_since_ms.take().is_some() {
            return Some(SessionEvent::RestWarningCleared { at_ms });
        }
        None
    }

    /// Evaluates both idle rules at `now_ms`. Call once per tick interval.
    pub fn tick(&mut self, now_ms: i64) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        if let Some(last_rep) = self.last_rep_at_ms {
            if self.reps_in_set >= 1
                && now_ms - last_rep >= self.config.set_completion_ms as i64
            {
                info!(
                    "set {} complete: {} reps, idle {} ms",
                    self.set_index,
                    self.reps_in_set,
                    now_ms - last_rep
                );
                events.push(SessionEvent::SetCompleted {
                    set_index: self.set_index,
                    rep_count: self.reps_in_set,
                    at_ms: now_ms,
                });
                self.set_index += 1;
                self.reps_in_set = 0;
                self.last_set_completed_at_ms = Some(now_ms);
                // Cleared so completion is declared once per idle period.
                self.last_rep_at_ms = None;
            }
        }

        let last_activity = self
            .last_rep_at_ms
            .into_iter()
            .chain(self.last_set_completed_at_ms)
            .max()
            .unwrap_or(self.session_start_ms);
        let idle = now_ms - last_activity;
        if idle > self.config.max_rest_ms as i64 && !self.rest_warned {
            self.rest_warned = true;
            self.warning_active_since_ms = Some(now_ms);
            events.push(SessionEvent::RestWarning {
                idle_ms: idle.max(0) as u64,
                at_ms: now_ms,
            });
        }

        if let Some(since) = self.warning_active_since_ms {
            if now_ms - since >= self.config.warning_display_ms as i64 {
                self.warning_active_since_ms = None;
                events.push(SessionEvent::RestWarningCleared { at_ms: now_ms });
            }
        }

        events
    }

    pub fn reset(&mut self, session_start_ms: i64) {
        *self = Self::new(self.config.clone(), session_start_ms);
    }
}
