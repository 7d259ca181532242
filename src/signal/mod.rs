pub mod features;
pub mod ingest;
pub mod pace;
pub mod rep_detector;
pub mod smoother;

pub use features::{extract_features, sub_windows, CollectionProgress, FeatureCollection, FeatureVector};
pub use ingest::SampleNormalizer;
pub use pace::PaceTracker;
pub use rep_detector::{RepDetector, RepDetectorConfig};
pub use smoother::EmaSmoother;
