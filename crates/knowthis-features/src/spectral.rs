use crate::spectrum::Spectrum;
use knowthis_core::{AnalysisConfig, FeatureGroup, Frame, InternalError};

const FLATNESS_EPS: f64 = 1e-10;

/// Per-frame spectral shape and time-domain energy measures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralFeatures {
    pub centroid: f64,
    pub bandwidth: f64,
    pub rolloff: f64,
    pub flatness: f64,
    pub zero_crossing_rate: f64,
    pub rms: f64,
}

impl SpectralFeatures {
    /// Values reported for a frame with no measurable energy.
    pub const SILENT: SpectralFeatures = SpectralFeatures {
        centroid: 0.0,
        bandwidth: 0.0,
        rolloff: 0.0,
        flatness: 1.0,
        zero_crossing_rate: 0.0,
        rms: 0.0,
    };

    /// Row in `SPECTRAL_FEATURES` order.
    pub fn to_row(&self) -> Vec<f64> {
        vec![
            self.centroid,
            self.bandwidth,
            self.rolloff,
            self.flatness,
            self.zero_crossing_rate,
            self.rms,
        ]
    }
}

pub fn zero_crossing_rate(raw: &[f32]) -> f64 {
    if raw.is_empty() {
        return 0.0;
    }
    let crossings = raw
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f64 / raw.len() as f64
}

pub fn rms(raw: &[f32]) -> f64 {
    if raw.is_empty() {
        return 0.0;
    }
    let sum: f64 = raw.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / raw.len() as f64).sqrt()
}

#[derive(Debug, Clone)]
pub struct SpectralExtractor {
    spectrum: Spectrum,
    rolloff_fraction: f64,
    silence_threshold: f64,
    names: Vec<String>,
}

impl SpectralExtractor {
    pub fn new(config: &AnalysisConfig, spectrum: Spectrum) -> Self {
        Self {
            spectrum,
            rolloff_fraction: config.spectral.rolloff_fraction,
            silence_threshold: config.spectral.silence_threshold,
            names: FeatureGroup::Spectral.feature_names(config),
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn extract_spectral(&self, frame: &Frame) -> Result<SpectralFeatures, InternalError> {
        let magnitude = self.spectrum.magnitude(&frame.windowed)?;
        Ok(self.features_from_magnitude(frame, &magnitude))
    }

    /// Spectral measures from a precomputed magnitude spectrum; zero-crossings
    /// and RMS come from the frame's untapered samples.
    pub fn features_from_magnitude(&self, frame: &Frame, magnitude: &[f64]) -> SpectralFeatures {
        let total: f64 = magnitude.iter().sum();
        if total <= self.silence_threshold {
            return SpectralFeatures::SILENT;
        }

        let freqs: Vec<f64> = (0..magnitude.len()).map(|k| self.spectrum.bin_hz(k)).collect();

        let centroid = freqs
            .iter()
            .zip(magnitude)
            .map(|(f, m)| f * m)
            .sum::<f64>()
            / total;

        let bandwidth = (freqs
            .iter()
            .zip(magnitude)
            .map(|(f, m)| m * (f - centroid).powi(2))
            .sum::<f64>()
            / total)
            .sqrt();

        let energy: f64 = magnitude.iter().map(|m| m * m).sum();
        let target = self.rolloff_fraction * energy;
        let mut cumulative = 0.0;
        let mut rolloff = freqs.last().copied().unwrap_or(0.0);
        for (f, m) in freqs.iter().zip(magnitude) {
            cumulative += m * m;
            if cumulative >= target {
                rolloff = *f;
                break;
            }
        }

        let log_mean = magnitude
            .iter()
            .map(|m| m.max(FLATNESS_EPS).ln())
            .sum::<f64>()
            / magnitude.len() as f64;
        let arith_mean = magnitude.iter().map(|m| m.max(FLATNESS_EPS)).sum::<f64>()
            / magnitude.len() as f64;
        let flatness = (log_mean.exp() / arith_mean).clamp(0.0, 1.0);

        SpectralFeatures {
            centroid,
            bandwidth,
            rolloff,
            flatness,
            zero_crossing_rate: zero_crossing_rate(&frame.raw),
            rms: rms(&frame.raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knowthis_audio::window;
    use knowthis_core::WindowKind;

    fn tone_frame(freq: f32, rate: u32, n: usize) -> Frame {
        let raw: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.5)
            .collect();
        let windowed = raw
            .iter()
            .zip(window(WindowKind::Hann, n))
            .map(|(s, w)| s * w)
            .collect();
        Frame {
            index: 0,
            start: 0,
            raw,
            windowed,
        }
    }

    fn extractor() -> SpectralExtractor {
        SpectralExtractor::new(&AnalysisConfig::default(), Spectrum::new(1024, 16000))
    }

    #[test]
    fn test_zero_crossing_rate_counts_sign_changes() {
        assert_eq!(zero_crossing_rate(&[1.0, -1.0, 1.0, -1.0]), 0.75);
        assert_eq!(zero_crossing_rate(&[0.0; 8]), 0.0);
        assert_eq!(zero_crossing_rate(&[]), 0.0);
    }

    #[test]
    fn test_rms_of_constant() {
        assert!((rms(&[0.5; 16]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_silent_frame_uses_sentinels() {
        let frame = Frame {
            index: 0,
            start: 0,
            raw: vec![0.0; 1024],
            windowed: vec![0.0; 1024],
        };
        let features = extractor().extract_spectral(&frame).unwrap();
        assert_eq!(features, SpectralFeatures::SILENT);
    }

    #[test]
    fn test_tone_centroid_and_flatness() {
        let features = extractor().extract_spectral(&tone_frame(1000.0, 16000, 1024)).unwrap();
        assert!((features.centroid - 1000.0).abs() < 50.0, "{:?}", features);
        assert!(features.bandwidth < 200.0);
        assert!((features.rolloff - 1000.0).abs() < 32.0);
        assert!(features.flatness < 0.1);
        // 1 kHz at 16 kHz crosses zero twice per 16 samples.
        assert!((features.zero_crossing_rate - 0.125).abs() < 0.01);
        assert!((features.rms - 0.5 / 2f64.sqrt()).abs() < 0.01);
    }

    #[test]
    fn test_noise_is_flatter_than_tone() {
        let mut state = 12345u32;
        let raw: Vec<f32> = (0..1024)
            .map(|_| {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                ((state >> 16) as f32 / 32768.0) - 1.0
            })
            .collect();
        let windowed = raw
            .iter()
            .zip(window(WindowKind::Hann, 1024))
            .map(|(s, w)| s * w)
            .collect();
        let noise = Frame {
            index: 0,
            start: 0,
            raw,
            windowed,
        };
        let ex = extractor();
        let noise_flatness = ex.extract_spectral(&noise).unwrap().flatness;
        let tone_flatness = ex.extract_spectral(&tone_frame(440.0, 16000, 1024)).unwrap().flatness;
        assert!(noise_flatness > 0.3, "noise flatness {noise_flatness}");
        assert!(noise_flatness > tone_flatness);
    }

    #[test]
    fn test_row_order() {
        let row = SpectralFeatures::SILENT.to_row();
        assert_eq!(row, vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        assert_eq!(extractor().feature_names()[3], "spectral_flatness");
    }
}
