use nalgebra::{Matrix3, SymmetricEigen, Vector3};

use crate::types::Sample;

/// Number of statistics in a window's feature vector.
pub const FEATURE_COUNT: usize = 18;

/// Fewer samples than this cannot be classified at all.
pub const MIN_CLASSIFY_SAMPLES: usize = 10;

/// Feature vector extracted from one window of samples: per-axis
/// mean/std/range, magnitude mean/std/range, explained-variance ratios of
/// the 3x3 covariance, and absolute first-component loadings.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector {
    pub values: [f64; FEATURE_COUNT],
}

/// Computes the feature vector for one closed window. The window is a
/// bounded, already-collected buffer, so looking across it is allowed.
pub fn extract_features(window: &[Sample]) -> FeatureVector {
    let n = window.len().max(1) as f64;

    let mut mean = Vector3::zeros();
    for s in window {
        mean += Vector3::new(s.x, s.y, s.z);
    }
    mean /= n;

    let mut var = Vector3::zeros();
    let mut min = Vector3::repeat(f64::INFINITY);
    let mut max = Vector3::repeat(f64::NEG_INFINITY);
    let mut cov = Matrix3::zeros();
    let mut mag_sum = 0.0;
    let mut mag_sq_sum = 0.0;
    let mut mag_min = f64::INFINITY;
    let mut mag_max = f64::NEG_INFINITY;

    for s in window {
        let v = Vector3::new(s.x, s.y, s.z);
        let d = v - mean;
        var += d.component_mul(&d);
        cov += d * d.transpose();
        min = min.inf(&v);
        max = max.sup(&v);
        mag_sum += s.magnitude;
        mag_sq_sum += s.magnitude * s.magnitude;
        mag_min = mag_min.min(s.magnitude);
        mag_max = mag_max.max(s.magnitude);
    }

    let std = (var / n).map(f64::sqrt);
    let range = max - min;
    let mag_mean = mag_sum / n;
    let mag_std = (mag_sq_sum / n - mag_mean * mag_mean).max(0.0).sqrt();
    let mag_range = mag_max - mag_min;
    cov /= n;

    // 3x3 symmetric eigendecomposition; sort components by eigenvalue,
    // largest first.
    let eig = SymmetricEigen::new(cov);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| {
        eig.eigenvalues[b]
            .partial_cmp(&eig.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let total: f64 = eig.eigenvalues.iter().map(|l| l.max(0.0)).sum();
    let ratio = |i: usize| {
        if total > 0.0 {
            eig.eigenvalues[order[i]].max(0.0) / total
        } else {
            0.0
        }
    };
    let pc1 = eig.eigenvectors.column(order[0]).abs();

    FeatureVector {
        values: [
            mean.x, mean.y, mean.z,
            std.x, std.y, std.z,
            range.x, range.y, range.z,
            mag_mean, mag_std, mag_range,
            ratio(0), ratio(1), ratio(2),
            pc1.x, pc1.y, pc1.z,
        ],
    }
}

/// Overlapping sub-windows of `size` samples advancing by `step`, sliding
/// over an already-collected window.
pub fn sub_windows(samples: &[Sample], size: usize, step: usize) -> impl Iterator<Item = &[Sample]> {
    let step = step.max(1);
    let upper = samples.len().saturating_sub(size.saturating_sub(1));
    (0..upper).step_by(step).map(move |start| &samples[start..start + size])
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectionProgress {
    Filling,
    Complete,
}

/// One in-flight classification window.
///
/// Accumulates samples until they span the requested duration. Completion is
/// measured on sample timestamps; expiry is measured on the session clock so
/// a stalled source cannot leave a collection pending forever. Used once,
/// then discarded.
pub struct FeatureCollection {
    samples: Vec<Sample>,
    window_ms: i64,
    deadline_ms: i64,
    complete: bool,
}

impl FeatureCollection {
    /// Timeout is twice the window duration.
    pub fn new(window_ms: u64, now_ms: i64) -> Self {
        Self {
            samples: Vec::new(),
            window_ms: window_ms as i64,
            deadline_ms: now_ms + 2 * window_ms as i64,
            complete: false,
        }
    }

    /// Adds one sample. Returns `Complete` once the buffered samples span
    /// the window duration.
    pub fn push(&mut self, sample: Sample) -> CollectionProgress {
        if self.complete {
            return CollectionProgress::Complete;
        }
        self.samples.push(sample);
        let first = self.samples[0].timestamp_ms;
        if sample.timestamp_ms - first >= self.window_ms {
            self.complete = true;
            return CollectionProgress::Complete;
        }
        CollectionProgress::Filling
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// True when the fill deadline passed before the window filled.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        !self.complete && now_ms > self.deadline_ms
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Consumes the collection, yielding the closed window.
    pub fn into_window(self) -> Vec<Sample> {
        self.samples
    }
}
