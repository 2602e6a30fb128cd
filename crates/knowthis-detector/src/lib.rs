pub mod detector_trait;
pub mod linear_detector;
pub mod policy;
pub mod registry;
pub mod rule_detector;

pub use detector_trait::Detector;
pub use linear_detector::LinearDetector;
pub use policy::{DecisionPolicy, EvidenceGate, MAX_REASONS};
pub use registry::{DetectorFactory, DetectorRegistry};
pub use rule_detector::RuleDetector;
