use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::session::rest::RestMonitorConfig;
use crate::signal::rep_detector::RepDetectorConfig;

/// Top-level configuration. Every tunable of the detection core lives here;
/// nothing in the pipeline reaches for hardcoded thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub detector: DetectorConfig,
    pub classifier: ClassifierConfig,
    pub rest: RestConfig,
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub channels: ChannelConfig,
}

/// Rep detection pipeline tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// EMA weight of the incoming magnitude, 0-1.
    pub smoothing_alpha: f64,
    /// Smoothed magnitude a peak must exceed to count as a rep.
    pub peak_threshold: f64,
    /// Refractory period after a confirmed rep.
    pub cooldown_ms: u64,
    /// Peak-to-intensity calibration; sensor dependent (12.0 for the
    /// onboard/simulated sensor, 80.0 for the external IMU).
    pub intensity_scale: f64,
    /// Readings with a larger magnitude are dropped as malformed.
    pub max_magnitude: f64,
    /// Emit a pace signal every N samples.
    pub pace_emit_every: u64,
}

/// Exercise classification tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Duration of the auto-detect collection window.
    pub window_secs: f64,
    /// Sub-window length, in samples, for the majority vote.
    pub sub_window: usize,
    /// Sub-window step, in samples.
    pub step: usize,
    /// Verdicts below this confidence surface as undetermined.
    pub min_confidence: f64,
    /// Fitted model file; the built-in fallback is used when absent.
    pub model_path: Option<String>,
}

/// Rest and set-boundary monitoring tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    pub set_completion_secs: f64,
    pub max_rest_secs: f64,
    pub warning_display_secs: f64,
    /// Monitor evaluation interval.
    pub tick_secs: f64,
}

/// Sample source selection and transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// "simulated" or "remote".
    pub kind: String,
    pub connect_timeout_secs: f64,
    pub mqtt: MqttConfig,
    pub simulated: SimulatedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub topics: MqttTopics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttTopics {
    pub samples: String,
    pub events: String,
    pub control: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    pub rate_hz: f64,
    pub rep_period_secs: f64,
    pub amplitude: f64,
    pub noise: f64,
    /// Stop after this long; endless when absent.
    pub duration_secs: Option<f64>,
}

/// Workout store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub enabled: bool,
    pub path: String,
}

/// Channel capacities for the worker fabric.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Remote reader thread -> engine queue.
    pub sample_queue_capacity: usize,
    /// Per-subscriber queue on each broadcast stream.
    pub event_queue_capacity: usize,
    pub store_task_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            classifier: ClassifierConfig::default(),
            rest: RestConfig::default(),
            source: SourceConfig::default(),
            store: StoreConfig::default(),
            channels: ChannelConfig::default(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.3,
            peak_threshold: 1.5,
            cooldown_ms: 800,
            intensity_scale: 12.0,
            max_magnitude: 1000.0,
            pace_emit_every: 3,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            window_secs: 4.0,
            sub_window: 80,
            step: 40,
            min_confidence: 0.55,
            model_path: None,
        }
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            set_completion_secs: 10.0,
            max_rest_secs: 120.0,
            warning_display_secs: 4.0,
            tick_secs: 1.0,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: "simulated".to_string(),
            connect_timeout_secs: 10.0,
            mqtt: MqttConfig::default(),
            simulated: SimulatedConfig::default(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "repsense_client".to_string(),
            keep_alive_secs: 5,
            topics: MqttTopics::default(),
        }
    }
}

impl Default for MqttTopics {
    fn default() -> Self {
        Self {
            samples: "imu/samples".to_string(),
            events: "imu/events".to_string(),
            control: "imu/control".to_string(),
        }
    }
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            rate_hz: 50.0,
            rep_period_secs: 2.0,
            amplitude: 2.5,
            noise: 0.05,
            duration_secs: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "data/workouts.db".to_string(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            sample_queue_capacity: 5000,
            event_queue_capacity: 256,
            store_task_capacity: 100,
        }
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::IoError)?;
        let config: AppConfig = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if !(self.detector.smoothing_alpha > 0.0 && self.detector.smoothing_alpha <= 1.0) {
            return fail("detector.smoothing_alpha must be in (0, 1]");
        }
        if self.detector.peak_threshold <= 0.0 {
            return fail("detector.peak_threshold must be positive");
        }
        if self.detector.intensity_scale <= 0.0 {
            return fail("detector.intensity_scale must be positive");
        }
        if self.detector.max_magnitude <= self.detector.peak_threshold {
            return fail("detector.max_magnitude must exceed peak_threshold");
        }
        if self.detector.pace_emit_every == 0 {
            return fail("detector.pace_emit_every must be at least 1");
        }
        if self.classifier.window_secs <= 0.0 {
            return fail("classifier.window_secs must be positive");
        }
        if self.classifier.sub_window == 0 || self.classifier.step == 0 {
            return fail("classifier.sub_window and step must be positive");
        }
        if !(0.0..=1.0).contains(&self.classifier.min_confidence) {
            return fail("classifier.min_confidence must be in [0, 1]");
        }
        if self.rest.set_completion_secs <= 0.0 || self.rest.tick_secs <= 0.0 {
            return fail("rest durations must be positive");
        }
        if self.rest.max_rest_secs < self.rest.set_completion_secs {
            return fail("rest.max_rest_secs must not be shorter than set_completion_secs");
        }
        if self.source.kind != "simulated" && self.source.kind != "remote" {
            return fail("source.kind must be \"simulated\" or \"remote\"");
        }
        if self.source.connect_timeout_secs <= 0.0 {
            return fail("source.connect_timeout_secs must be positive");
        }
        if self.source.simulated.rate_hz <= 0.0 || self.source.simulated.rep_period_secs <= 0.0 {
            return fail("simulated source rate and period must be positive");
        }
        if self.channels.sample_queue_capacity == 0
            || self.channels.event_queue_capacity == 0
            || self.channels.store_task_capacity == 0
        {
            return fail("channel capacities must be positive");
        }
        Ok(())
    }

    /// Detector view of the configuration.
    pub fn rep_detector(&self) -> RepDetectorConfig {
        RepDetectorConfig {
            smoothing_alpha: self.detector.smoothing_alpha,
            peak_threshold: self.detector.peak_threshold,
            cooldown_ms: self.detector.cooldown_ms,
            intensity_scale: self.detector.intensity_scale,
        }
    }

    /// Rest monitor view of the configuration.
    pub fn rest_monitor(&self) -> RestMonitorConfig {
        RestMonitorConfig {
            set_completion_ms: (self.rest.set_completion_secs * 1000.0) as u64,
            max_rest_ms: (self.rest.max_rest_secs * 1000.0) as u64,
            warning_display_ms: (self.rest.warning_display_secs * 1000.0) as u64,
        }
    }

    pub fn classification_window_ms(&self) -> u64 {
        (self.classifier.window_secs * 1000.0) as u64
    }

    pub fn connect_timeout_ms(&self) -> u64 {
        (self.source.connect_timeout_secs * 1000.0) as u64
    }

    pub fn rest_tick_ms(&self) -> u64 {
        (self.rest.tick_secs * 1000.0) as u64
    }

    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.store.path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(toml::de::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}
