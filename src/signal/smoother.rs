/// Causal exponential moving average over the magnitude signal.
///
/// `smoothed' = smoothed * (1 - alpha) + magnitude * alpha`, seeded by the
/// first observed value. O(1) time and memory per sample; output depends only
/// on samples seen so far, never on future input.
#[derive(Debug, Clone)]
pub struct EmaSmoother {
    alpha: f64,
    value: Option<f64>,
    previous: f64,
}

impl EmaSmoother {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            value: None,
            previous: 0.0,
        }
    }

    /// Feeds one magnitude and returns the new smoothed value.
    pub fn update(&mut self, magnitude: f64) -> f64 {
        let current = match self.value {
            None => magnitude,
            Some(prev) => prev * (1.0 - self.alpha) + magnitude * self.alpha,
        };
        self.previous = self.value.unwrap_or(current);
        self.value = Some(current);
        current
    }

    /// Current smoothed value, `None` until the first sample arrives.
    pub fn smoothed(&self) -> Option<f64> {
        self.value
    }

    /// Smoothed value before the most recent update. Equals the current value
    /// until two samples have been observed.
    pub fn previous(&self) -> f64 {
        self.previous
    }

    /// Clears back to the unseeded state.
    pub fn reset(&mut self) {
        self.value = None;
        self.previous = 0.0;
    }
}
