use std::path::Path;

use log::info;
use serde::Deserialize;

use crate::classifier::{Classification, ClassifierError, ExerciseModel};
use crate::signal::features::{FeatureVector, FEATURE_COUNT};

/// On-disk model layout: per-feature standardization parameters plus one
/// centroid per exercise label, fitted offline.
#[derive(Deserialize)]
struct ModelFile {
    feature_means: Vec<f64>,
    feature_stds: Vec<f64>,
    centroids: Vec<CentroidFile>,
}

#[derive(Deserialize)]
struct CentroidFile {
    label: String,
    values: Vec<f64>,
}

struct Centroid {
    label: String,
    values: [f64; FEATURE_COUNT],
}

/// Nearest-centroid exercise model over standardized features.
///
/// Confidence is the distance margin between the best and second-best
/// centroid, `d2 / (d1 + d2)`: 0.5 when the window sits exactly between two
/// exercises, approaching 1.0 as the best centroid dominates.
pub struct CentroidModel {
    means: [f64; FEATURE_COUNT],
    stds: [f64; FEATURE_COUNT],
    centroids: Vec<Centroid>,
}

impl CentroidModel {
    /// Loads a fitted model from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let content = std::fs::read_to_string(path)?;
        let file: ModelFile = serde_json::from_str(&content)?;
        let model = Self::from_parts(file)?;
        info!(
            "classifier: loaded {} centroids from {}",
            model.centroids.len(),
            path.display()
        );
        Ok(model)
    }

    fn from_parts(file: ModelFile) -> Result<Self, ClassifierError> {
        let means = fixed(&file.feature_means, "feature_means")?;
        let mut stds = fixed(&file.feature_stds, "feature_stds")?;
        // Degenerate features standardize to zero instead of dividing by zero.
        for s in &mut stds {
            if *s <= 0.0 || !s.is_finite() {
                *s = 1.0;
            }
        }
        if file.centroids.is_empty() {
            return Err(ClassifierError::InvalidModel("no centroids".to_string()));
        }
        let mut centroids = Vec::with_capacity(file.centroids.len());
        for c in file.centroids {
            centroids.push(Centroid {
                values: fixed(&c.values, &c.label)?,
                label: c.label,
            });
        }
        Ok(Self { means, stds, centroids })
    }

    /// Built-in fallback for running without a fitted model file. Centroids
    /// approximate the two stock exercises in raw feature space; a fitted
    /// model should be preferred whenever one is available.
    pub fn builtin() -> Self {
        let centroid = |label: &str, values: [f64; FEATURE_COUNT]| Centroid {
            label: label.to_string(),
            values,
        };
        Self {
            means: [0.0; FEATURE_COUNT],
            stds: [1.0; FEATURE_COUNT],
            centroids: vec![
                // Curls: forearm arc, motion split between x and z.
                centroid("bicep_curl", [
                    0.10, -0.30, 0.90,
                    0.35, 0.20, 0.30,
                    1.20, 0.70, 1.00,
                    1.10, 0.30, 1.10,
                    0.70, 0.20, 0.10,
                    0.75, 0.30, 0.55,
                ]),
                // Presses: vertical drive, variance concentrated on y.
                centroid("shoulder_press", [
                    0.00, 0.80, 0.40,
                    0.25, 0.45, 0.20,
                    0.90, 1.50, 0.80,
                    1.15, 0.40, 1.40,
                    0.80, 0.15, 0.05,
                    0.25, 0.90, 0.35,
                ]),
            ],
        }
    }

    fn standardize(&self, features: &FeatureVector) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            out[i] = (features.values[i] - self.means[i]) / self.stds[i];
        }
        out
    }
}

fn fixed(values: &[f64], what: &str) -> Result<[f64; FEATURE_COUNT], ClassifierError> {
    values.try_into().map_err(|_| {
        ClassifierError::InvalidModel(format!(
            "{}: expected {} values, got {}",
            what,
            FEATURE_COUNT,
            values.len()
        ))
    })
}

fn distance(a: &[f64; FEATURE_COUNT], b: &[f64; FEATURE_COUNT]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

impl ExerciseModel for CentroidModel {
    fn classify(&self, features: &FeatureVector) -> Classification {
        let x = self.standardize(features);
        let mut best: Option<(usize, f64)> = None;
        let mut second = f64::INFINITY;
        for (i, c) in self.centroids.iter().enumerate() {
            let d = distance(&x, &c.values);
            match best {
                None => best = Some((i, d)),
                Some((_, bd)) if d < bd => {
                    second = bd;
                    best = Some((i, d));
                }
                _ => second = second.min(d),
            }
        }
        let (idx, d1) = best.expect("model has at least one centroid");
        let confidence = if second.is_finite() && d1 + second > 0.0 {
            second / (d1 + second)
        } else {
            1.0
        };
        Classification {
            label: self.centroids[idx].label.clone(),
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_centroid_model() -> CentroidModel {
        CentroidModel::from_parts(ModelFile {
            feature_means: vec![0.0; FEATURE_COUNT],
            feature_stds: vec![1.0; FEATURE_COUNT],
            centroids: vec![
                CentroidFile {
                    label: "a".to_string(),
                    values: {
                        let mut v = vec![0.0; FEATURE_COUNT];
                        v[0] = 1.0;
                        v
                    },
                },
                CentroidFile {
                    label: "b".to_string(),
                    values: {
                        let mut v = vec![0.0; FEATURE_COUNT];
                        v[0] = -1.0;
                        v
                    },
                },
            ],
        })
        .unwrap()
    }

    fn features(first: f64) -> FeatureVector {
        let mut values = [0.0; FEATURE_COUNT];
        values[0] = first;
        FeatureVector { values }
    }

    #[test]
    fn picks_the_nearest_centroid() {
        let m = two_centroid_model();
        assert_eq!(m.classify(&features(0.9)).label, "a");
        assert_eq!(m.classify(&features(-0.9)).label, "b");
    }

    #[test]
    fn equidistant_input_has_floor_confidence() {
        let m = two_centroid_model();
        let c = m.classify(&features(0.0));
        assert!((c.confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn confidence_grows_near_a_centroid() {
        let m = two_centroid_model();
        let near = m.classify(&features(0.95)).confidence;
        let mid = m.classify(&features(0.2)).confidence;
        assert!(near > mid);
        assert!(near > 0.9);
        assert!(near <= 1.0);
    }

    #[test]
    fn wrong_feature_count_is_rejected() {
        let result = CentroidModel::from_parts(ModelFile {
            feature_means: vec![0.0; 5],
            feature_stds: vec![1.0; FEATURE_COUNT],
            centroids: vec![],
        });
        assert!(matches!(result, Err(ClassifierError::InvalidModel(_))));
    }

    #[test]
    fn builtin_model_separates_the_stock_exercises() {
        let m = CentroidModel::builtin();
        // A window matching the curl centroid classifies as a confident curl.
        let c = m.classify(&FeatureVector {
            values: m.centroids[0].values,
        });
        assert_eq!(c.label, "bicep_curl");
        assert!(c.confidence > 0.9);
    }
}
