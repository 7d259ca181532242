use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimulatedConfig;
use crate::source::{SampleSource, SourceError, SourceEvent};
use crate::types::RawReading;

/// Waveform generator standing in for a live sensor: a 1 g resting vector
/// with periodic acceleration lobes on the primary axis and white noise on
/// all three. Paced in real time at the configured rate; optionally finite.
pub struct SimulatedSource {
    interval: Duration,
    rep_period_s: f64,
    amplitude: f64,
    noise: f64,
    remaining: Option<u64>,
    rng: StdRng,
    next_due: Instant,
    elapsed_s: f64,
    announced: bool,
    closed: bool,
}

impl SimulatedSource {
    pub fn new(config: &SimulatedConfig) -> Self {
        let rate = config.rate_hz.max(1.0);
        let remaining = config
            .duration_secs
            .map(|secs| (secs * rate).ceil() as u64);
        info!(
            "simulated source: {} Hz, rep period {:.1}s, {}",
            rate,
            config.rep_period_secs,
            match remaining {
                Some(n) => format!("{} samples", n),
                None => "endless".to_string(),
            }
        );
        Self {
            interval: Duration::from_secs_f64(1.0 / rate),
            rep_period_s: config.rep_period_secs.max(0.1),
            amplitude: config.amplitude,
            noise: config.noise,
            remaining,
            rng: StdRng::from_os_rng(),
            next_due: Instant::now(),
            elapsed_s: 0.0,
            announced: false,
            closed: false,
        }
    }

    fn next_reading(&mut self) -> RawReading {
        self.elapsed_s += self.interval.as_secs_f64();
        // Positive half-sine lobes, squared for a rest phase between reps.
        let phase = (std::f64::consts::TAU * self.elapsed_s / self.rep_period_s).sin();
        let lobe = self.amplitude * phase.max(0.0).powi(2);
        let noise = self.noise;
        let mut axis = |base: f64| base + noise * self.rng.random_range(-1.0..1.0);
        RawReading::new(
            axis(lobe),
            axis(0.0),
            axis(1.0),
            Some(Utc::now().timestamp_millis()),
        )
    }
}

impl SampleSource for SimulatedSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn poll(&mut self, timeout: Duration) -> Result<SourceEvent, SourceError> {
        if !self.announced {
            self.announced = true;
            return Ok(SourceEvent::Connected);
        }
        if self.remaining == Some(0) {
            if self.closed {
                thread::sleep(timeout);
                return Ok(SourceEvent::Idle);
            }
            self.closed = true;
            return Ok(SourceEvent::Closed);
        }

        let now = Instant::now();
        if self.next_due > now {
            let wait = self.next_due - now;
            if wait > timeout {
                thread::sleep(timeout);
                return Ok(SourceEvent::Idle);
            }
            thread::sleep(wait);
        }
        self.next_due += self.interval;
        if let Some(n) = self.remaining.as_mut() {
            *n -= 1;
        }
        Ok(SourceEvent::Sample(self.next_reading()))
    }

    fn request_auto_detect(&mut self) -> Result<(), SourceError> {
        // Collection and classification happen locally.
        Ok(())
    }

    fn request_reset(&mut self) -> Result<(), SourceError> {
        self.elapsed_s = 0.0;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.remaining = Some(0);
    }
}
