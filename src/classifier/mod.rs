pub mod centroid;

use std::collections::HashMap;

use crate::signal::features::{
    extract_features, sub_windows, FeatureVector, MIN_CLASSIFY_SAMPLES,
};
use crate::types::{AutoDetectOutcome, Sample};

pub use centroid::CentroidModel;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("window too short to classify ({got} samples, need {need})")]
    WindowTooShort { got: usize, need: usize },
    #[error("failed to read model file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse model file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid model: {0}")]
    InvalidModel(String),
}

/// One classification verdict: a label and how confidently it was chosen.
#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
}

/// A trained exercise model: a pure function from a feature vector to a
/// labeled verdict. Precomputed and swapped in at configuration time; no
/// online learning in the core.
pub trait ExerciseModel: Send {
    fn classify(&self, features: &FeatureVector) -> Classification;
}

/// Classifies a closed window of samples by majority vote over overlapping
/// sub-windows, the confidence being the mean confidence of the winning
/// label's votes. Windows shorter than one sub-window are classified whole.
pub fn classify_window(
    model: &dyn ExerciseModel,
    window: &[Sample],
    sub_window: usize,
    step: usize,
) -> Result<Classification, ClassifierError> {
    if window.len() < MIN_CLASSIFY_SAMPLES {
        return Err(ClassifierError::WindowTooShort {
            got: window.len(),
            need: MIN_CLASSIFY_SAMPLES,
        });
    }

    if window.len() < sub_window {
        return Ok(model.classify(&extract_features(window)));
    }

    let mut votes: HashMap<String, (u32, f64)> = HashMap::new();
    for sub in sub_windows(window, sub_window, step) {
        let c = model.classify(&extract_features(sub));
        let entry = votes.entry(c.label).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += c.confidence;
    }

    let (label, (count, confidence_sum)) = votes
        .into_iter()
        .max_by(|a, b| {
            a.1 .0
                .cmp(&b.1 .0)
                .then(a.1 .1.partial_cmp(&b.1 .1).unwrap_or(std::cmp::Ordering::Equal))
        })
        .expect("at least one sub-window");

    Ok(Classification {
        label,
        confidence: confidence_sum / count as f64,
    })
}

/// Applies the confidence gate: verdicts below `min_confidence` surface as
/// `Undetermined` instead of being promoted to a label.
pub fn gate_confidence(verdict: Classification, min_confidence: f64) -> AutoDetectOutcome {
    if verdict.confidence >= min_confidence {
        AutoDetectOutcome::Exercise {
            label: verdict.label,
            confidence: verdict.confidence,
        }
    } else {
        AutoDetectOutcome::Undetermined {
            best_guess: verdict.label,
            confidence: verdict.confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sample;

    /// Labels windows by the sign of mean_x, with a fixed confidence.
    struct SignModel {
        confidence: f64,
    }

    impl ExerciseModel for SignModel {
        fn classify(&self, features: &FeatureVector) -> Classification {
            let label = if features.values[0] >= 0.0 { "press" } else { "curl" };
            Classification {
                label: label.to_string(),
                confidence: self.confidence,
            }
        }
    }

    fn flat(x: f64, n: usize) -> Vec<Sample> {
        (0..n).map(|i| Sample::new(x, 0.0, 0.0, i as i64 * 10)).collect()
    }

    #[test]
    fn too_short_window_is_an_error() {
        let model = SignModel { confidence: 0.9 };
        let window = flat(1.0, 9);
        assert!(matches!(
            classify_window(&model, &window, 80, 40),
            Err(ClassifierError::WindowTooShort { got: 9, .. })
        ));
    }

    #[test]
    fn short_window_is_classified_whole() {
        let model = SignModel { confidence: 0.9 };
        let window = flat(1.0, 30);
        let c = classify_window(&model, &window, 80, 40).unwrap();
        assert_eq!(c.label, "press");
        assert!((c.confidence - 0.9).abs() < 1e-12);
    }

    #[test]
    fn majority_vote_picks_the_dominant_label() {
        let model = SignModel { confidence: 0.8 };
        // 3 sub-windows of 80 at step 40 over 160 samples: starts 0, 40, 80.
        // First 100 samples positive, rest negative: windows at 0 and 40 vote
        // press, the window at 80 votes curl.
        let mut window = flat(1.0, 100);
        window.extend(flat(-1.0, 60).iter().map(|s| Sample::new(s.x, s.y, s.z, 1000 + s.timestamp_ms)));
        let c = classify_window(&model, &window, 80, 40).unwrap();
        assert_eq!(c.label, "press");
    }

    #[test]
    fn gate_surfaces_low_confidence_as_undetermined() {
        let verdict = Classification {
            label: "bicep_curl".to_string(),
            confidence: 0.5,
        };
        match gate_confidence(verdict.clone(), 0.55) {
            AutoDetectOutcome::Undetermined { best_guess, confidence } => {
                assert_eq!(best_guess, "bicep_curl");
                assert!((confidence - 0.5).abs() < 1e-12);
            }
            other => panic!("expected undetermined, got {:?}", other),
        }
        match gate_confidence(verdict, 0.4) {
            AutoDetectOutcome::Exercise { label, .. } => assert_eq!(label, "bicep_curl"),
            other => panic!("expected exercise, got {:?}", other),
        }
    }

    #[test]
    fn zero_threshold_disables_the_gate() {
        let verdict = Classification {
            label: "shoulder_press".to_string(),
            confidence: 0.0,
        };
        assert!(matches!(
            gate_confidence(verdict, 0.0),
            AutoDetectOutcome::Exercise { .. }
        ));
    }
}
