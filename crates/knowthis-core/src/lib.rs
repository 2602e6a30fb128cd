pub mod config;
pub mod error;
pub mod types;

pub use config::{
    AnalysisConfig, CepstralConfig, DecoderConfig, DetectorConfig, DetectorWeights,
    FramingConfig, LinearConfig, LinearGroupConfig, PitchConfig, Ramp, RuleConfig,
    SpectralConfig, WindowKind,
};
pub use error::{AnalysisError, ConfigError, DecodeError, InternalError};
pub use types::{
    AudioBuffer, FeatureGroup, FeatureStream, FeatureVector, Fingerprint, FingerprintKey,
    FingerprintLayout, Frame, Label, Reduction, SubScores, Verdict, CONTOUR_FEATURE,
    PITCH_FEATURES, SPECTRAL_FEATURES,
};
