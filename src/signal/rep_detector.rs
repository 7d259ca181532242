use log::debug;

use crate::signal::smoother::EmaSmoother;
use crate::types::{RepEvent, Sample};

/// Configuration for the peak-valley rep detector.
#[derive(Debug, Clone)]
pub struct RepDetectorConfig {
    /// EMA weight given to the incoming magnitude (0-1, higher = faster).
    pub smoothing_alpha: f64,
    /// Smoothed magnitude a peak must exceed to count as a rep.
    pub peak_threshold: f64,
    /// Refractory period after a confirmed rep; peaks inside it are ignored.
    pub cooldown_ms: u64,
    /// Calibration for peak -> intensity. Sensor dependent: ~12 for the
    /// onboard/simulated sensor, ~80 for the external IMU.
    pub intensity_scale: f64,
}

impl Default for RepDetectorConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.3,
            peak_threshold: 1.5,
            cooldown_ms: 800,
            intensity_scale: 12.0,
        }
    }
}

/// Peak-valley state machine over the smoothed magnitude.
///
/// Tracks the ascending/descending trend of the EMA output; a rep is
/// confirmed on the first descending sample after an ascent whose peak
/// exceeded the threshold, provided the cooldown since the last confirmed
/// rep has elapsed. Later peaks inside the cooldown are dropped, not queued.
pub struct RepDetector {
    config: RepDetectorConfig,
    smoother: EmaSmoother,
    ascending: bool,
    last_rep_at_ms: Option<i64>,
    session_start_ms: i64,
    rep_count: u32,
}

impl RepDetector {
    pub fn new(config: RepDetectorConfig, session_start_ms: i64) -> Self {
        let smoother = EmaSmoother::new(config.smoothing_alpha);
        Self {
            config,
            smoother,
            ascending: false,
            last_rep_at_ms: None,
            session_start_ms,
            rep_count: 0,
        }
    }

    /// Feeds one sample; returns a `RepEvent` when this sample confirms a rep.
    pub fn process_sample(&mut self, sample: &Sample) -> Option<RepEvent> {
        let previous = self.smoother.smoothed();
        let smoothed = self.smoother.update(sample.magnitude);

        let previous = match previous {
            Some(p) => p,
            None => {
                // First sample only seeds the filter; no trend yet.
                self.ascending = false;
                return None;
            }
        };

        let was_ascending = self.ascending;
        self.ascending = smoothed > previous;

        // A peak is the transition from ascending to descending.
        if !was_ascending || self.ascending {
            return None;
        }
        if previous <= self.config.peak_threshold {
            debug!("peak {:.3} below threshold, ignored", previous);
            return None;
        }

        let now = sample.timestamp_ms;
        if let Some(last) = self.last_rep_at_ms {
            if now - last <= self.config.cooldown_ms as i64 {
                debug!("peak {:.3} inside cooldown, ignored", previous);
                return None;
            }
        }

        let since = self.last_rep_at_ms.unwrap_or(self.session_start_ms);
        // Clock skew can only shorten a duration, never make it negative.
        let duration_ms = (now - since).max(0) as u64;

        self.last_rep_at_ms = Some(now);
        self.rep_count += 1;

        Some(RepEvent::new(
            now,
            previous,
            duration_ms,
            previous / self.config.intensity_scale,
        ))
    }

    pub fn rep_count(&self) -> u32 {
        self.rep_count
    }

    pub fn last_rep_at_ms(&self) -> Option<i64> {
        self.last_rep_at_ms
    }

    pub fn is_ascending(&self) -> bool {
        self.ascending
    }

    /// Current smoothed magnitude, `None` before the first sample.
    pub fn smoothed(&self) -> Option<f64> {
        self.smoother.smoothed()
    }

    /// Clears every piece of mutable state for a fresh session. The first
    /// sample after a reset can never confirm a rep from residual trend.
    pub fn reset(&mut self, session_start_ms: i64) {
        self.smoother.reset();
        self.ascending = false;
        self.last_rep_at_ms = None;
        self.session_start_ms = session_start_ms;
        self.rep_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(detector: &mut RepDetector, magnitudes: &[f64], spacing_ms: i64) -> Vec<RepEvent> {
        let mut events = Vec::new();
        for (i, &m) in magnitudes.iter().enumerate() {
            let sample = Sample::new(m, 0.0, 0.0, i as i64 * spacing_ms);
            if let Some(e) = detector.process_sample(&sample) {
                events.push(e);
            }
        }
        events
    }

    const SCENARIO: [f64; 12] = [0.0, 0.5, 1.0, 2.0, 1.8, 1.0, 0.3, 0.2, 2.5, 2.3, 1.0, 0.1];

    #[test]
    fn scenario_detects_both_peaks_with_fast_alpha() {
        let config = RepDetectorConfig {
            smoothing_alpha: 0.7,
            peak_threshold: 1.5,
            cooldown_ms: 150,
            ..Default::default()
        };
        let mut d = RepDetector::new(config, 0);
        let events = feed(&mut d, &SCENARIO, 50);

        assert_eq!(events.len(), 2, "expected both humps to confirm");
        // EMA lag confirms on the falling edge just after the raw peaks at
        // indices 3 and 8.
        assert_eq!(events[0].timestamp_ms, 250);
        assert_eq!(events[1].timestamp_ms, 500);
        assert!((events[0].peak_acceleration - 1.75245).abs() < 1e-6);
        assert!((events[1].peak_acceleration - 2.16320).abs() < 1e-4);
        assert_eq!(events[0].duration_ms, 250);
        assert_eq!(events[1].duration_ms, 250);
    }

    #[test]
    fn scenario_cooldown_admits_only_the_first_peak() {
        // Same waveform, default 800 ms cooldown: the humps are 250 ms apart,
        // so only the first can confirm.
        let config = RepDetectorConfig {
            smoothing_alpha: 0.7,
            peak_threshold: 1.5,
            cooldown_ms: 800,
            ..Default::default()
        };
        let mut d = RepDetector::new(config, 0);
        let events = feed(&mut d, &SCENARIO, 50);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp_ms, 250);
    }

    #[test]
    fn scenario_default_alpha_smooths_first_hump_below_threshold() {
        // With the default alpha = 0.3 only the taller second hump survives
        // smoothing above the 1.5 threshold.
        let mut d = RepDetector::new(RepDetectorConfig::default(), 0);
        let events = feed(&mut d, &SCENARIO, 50);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp_ms, 500);
        assert!((events[0].peak_acceleration - 1.5420).abs() < 1e-3);
    }

    #[test]
    fn cooldown_separates_two_reps() {
        // Two identical humps; spacing chosen so the second peak lands first
        // inside and then outside the cooldown window.
        let hump = [0.0, 4.0, 0.0];
        let mut magnitudes = Vec::new();
        magnitudes.extend_from_slice(&hump);
        magnitudes.extend_from_slice(&hump);

        let config = RepDetectorConfig {
            smoothing_alpha: 0.7,
            peak_threshold: 1.5,
            cooldown_ms: 800,
            ..Default::default()
        };

        // 200 ms spacing: peaks ~600 ms apart, inside the cooldown.
        let mut d = RepDetector::new(config.clone(), 0);
        assert_eq!(feed(&mut d, &magnitudes, 200).len(), 1);

        // 500 ms spacing: peaks 1500 ms apart, outside the cooldown.
        let mut d = RepDetector::new(config, 0);
        assert_eq!(feed(&mut d, &magnitudes, 500).len(), 2);
    }

    #[test]
    fn sub_threshold_waveforms_never_confirm() {
        let config = RepDetectorConfig {
            smoothing_alpha: 0.7,
            peak_threshold: 1.5,
            cooldown_ms: 0,
            ..Default::default()
        };
        let shapes: [&[f64]; 3] = [
            &[0.0, 1.0, 0.0, 1.2, 0.0, 1.4, 0.0],
            &[1.4, 1.3, 1.4, 1.3, 1.4, 1.3],
            &[0.0, 0.5, 1.0, 1.49, 1.0, 0.5, 0.0],
        ];
        for shape in shapes {
            let mut d = RepDetector::new(config.clone(), 0);
            assert!(
                feed(&mut d, shape, 100).is_empty(),
                "sub-threshold shape produced a rep: {:?}",
                shape
            );
        }
    }

    #[test]
    fn intensity_clamps_to_unit_interval() {
        let config = RepDetectorConfig {
            smoothing_alpha: 1.0,
            peak_threshold: 1.5,
            cooldown_ms: 0,
            intensity_scale: 12.0,
        };
        let mut d = RepDetector::new(config, 0);
        // Peak far beyond the calibration scale.
        let events = feed(&mut d, &[0.0, 500.0, 0.0], 1000);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].intensity, 1.0);

        let mut d = RepDetector::new(
            RepDetectorConfig {
                smoothing_alpha: 1.0,
                peak_threshold: 1.5,
                cooldown_ms: 0,
                intensity_scale: 12.0,
            },
            0,
        );
        let events = feed(&mut d, &[0.0, 6.0, 0.0], 1000);
        assert_eq!(events.len(), 1);
        assert!((events[0].intensity - 0.5).abs() < 1e-12);
    }

    #[test]
    fn reset_discards_residual_state() {
        let config = RepDetectorConfig {
            smoothing_alpha: 0.7,
            peak_threshold: 1.5,
            cooldown_ms: 0,
            ..Default::default()
        };
        let mut d = RepDetector::new(config, 0);
        feed(&mut d, &[0.0, 4.0, 3.9], 100);
        assert!(d.is_ascending() || d.smoothed().is_some());

        d.reset(10_000);
        assert_eq!(d.rep_count(), 0);
        assert_eq!(d.last_rep_at_ms(), None);
        assert_eq!(d.smoothed(), None);
        // A lone falling sample right after reset cannot close out the old
        // session's ascent.
        let first = Sample::new(0.1, 0.0, 0.0, 10_000);
        assert!(d.process_sample(&first).is_none());
        assert!(!d.is_ascending());
    }

    #[test]
    fn last_rep_time_only_advances() {
        let config = RepDetectorConfig {
            smoothing_alpha: 0.7,
            peak_threshold: 1.5,
            cooldown_ms: 100,
            ..Default::default()
        };
        let mut d = RepDetector::new(config, 0);
        let events = feed(&mut d, &[0.0, 4.0, 0.0, 4.0, 0.0, 4.0, 0.0], 400);
        assert!(events.len() >= 2);
        let mut last = -1;
        for e in &events {
            assert!(e.timestamp_ms > last);
            last = e.timestamp_ms;
        }
        assert_eq!(d.last_rep_at_ms(), Some(last));
    }

    #[test]
    fn first_rep_duration_runs_from_session_start() {
        let config = RepDetectorConfig {
            smoothing_alpha: 0.7,
            peak_threshold: 1.5,
            cooldown_ms: 0,
            ..Default::default()
        };
        let mut d = RepDetector::new(config, 0);
        let events = feed(&mut d, &[0.0, 4.0, 0.0], 300);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].duration_ms, 600);
    }
}
