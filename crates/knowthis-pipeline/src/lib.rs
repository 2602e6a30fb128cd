pub mod analyzer;

pub use analyzer::{analyze, Analysis, Analyzer};
pub use knowthis_audio::FormatHint;
pub use knowthis_detector::{Detector, DetectorFactory, DetectorRegistry};
