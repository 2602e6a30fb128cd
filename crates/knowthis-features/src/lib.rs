pub mod aggregator;
pub mod cepstral;
pub mod extractor;
pub mod pitch;
pub mod spectral;
pub mod spectrum;

pub use aggregator::aggregate;
pub use cepstral::{CepstralExtractor, MelFilterBank};
pub use extractor::FeatureExtractor;
pub use pitch::{PitchEstimate, PitchExtractor};
pub use spectral::{rms, zero_crossing_rate, SpectralExtractor, SpectralFeatures};
pub use spectrum::Spectrum;
