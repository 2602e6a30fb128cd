//! Mel-frequency cepstral coefficients.

use crate::spectrum::Spectrum;
use knowthis_core::{AnalysisConfig, FeatureGroup, Frame, InternalError};
use std::f64::consts::PI;

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0_f64.powf(mel / 2595.0) - 1.0)
}

/// Triangular filters spaced evenly on the mel scale.
///
/// Weights are evaluated at each bin's exact frequency rather than snapped
/// to bin indices, so narrow low-frequency bands never collapse to zero width.
#[derive(Debug, Clone)]
pub struct MelFilterBank {
    /// `[num_bands][bins]`
    weights: Vec<Vec<f64>>,
}

impl MelFilterBank {
    pub fn new(num_bands: usize, spectrum: &Spectrum, low_hz: f64, high_hz: f64) -> Self {
        let low_mel = hz_to_mel(low_hz);
        let high_mel = hz_to_mel(high_hz);
        let step = (high_mel - low_mel) / (num_bands + 1) as f64;
        let edges: Vec<f64> = (0..num_bands + 2)
            .map(|i| mel_to_hz(low_mel + i as f64 * step))
            .collect();

        let weights = (0..num_bands)
            .map(|m| {
                let (left, center, right) = (edges[m], edges[m + 1], edges[m + 2]);
                (0..spectrum.bins())
                    .map(|k| {
                        let f = spectrum.bin_hz(k);
                        let rising = (f - left) / (center - left);
                        let falling = (right - f) / (right - center);
                        rising.min(falling).max(0.0)
                    })
                    .collect()
            })
            .collect();
        Self { weights }
    }

    pub fn num_bands(&self) -> usize {
        self.weights.len()
    }

    /// Energy per band from a power spectrum.
    pub fn apply(&self, power: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .map(|filter| filter.iter().zip(power).map(|(w, p)| w * p).sum())
            .collect()
    }
}

/// Orthonormal DCT-II basis truncated to the first `num_coefficients` rows.
#[derive(Debug, Clone)]
struct DctBasis {
    rows: Vec<Vec<f64>>,
}

impl DctBasis {
    fn new(num_coefficients: usize, num_inputs: usize) -> Self {
        let m = num_inputs as f64;
        let rows = (0..num_coefficients)
            .map(|k| {
                let scale = if k == 0 { (1.0 / m).sqrt() } else { (2.0 / m).sqrt() };
                (0..num_inputs)
                    .map(|n| scale * (PI * k as f64 * (n as f64 + 0.5) / m).cos())
                    .collect()
            })
            .collect();
        Self { rows }
    }

    fn transform(&self, input: &[f64]) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.iter().zip(input).map(|(b, x)| b * x).sum())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CepstralExtractor {
    spectrum: Spectrum,
    filter_bank: MelFilterBank,
    dct: DctBasis,
    log_floor: f64,
    names: Vec<String>,
}

impl CepstralExtractor {
    pub fn new(config: &AnalysisConfig, spectrum: Spectrum) -> Self {
        let c = &config.cepstral;
        let high_hz = c.high_freq_hz.unwrap_or_else(|| config.nyquist_hz());
        let filter_bank = MelFilterBank::new(c.num_bands, &spectrum, c.low_freq_hz, high_hz);
        let dct = DctBasis::new(c.num_coefficients, c.num_bands);
        Self {
            spectrum,
            filter_bank,
            dct,
            log_floor: c.log_floor,
            names: FeatureGroup::Cepstral.feature_names(config),
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn filter_bank(&self) -> &MelFilterBank {
        &self.filter_bank
    }

    /// MFCCs of one frame, computing its spectrum first.
    pub fn extract_mfcc(&self, frame: &Frame) -> Result<Vec<f64>, InternalError> {
        let magnitude = self.spectrum.magnitude(&frame.windowed)?;
        Ok(self.mfcc_from_magnitude(&magnitude))
    }

    /// MFCCs from a precomputed magnitude spectrum. Band energies are in dB,
    /// floored at `log_floor` before the log.
    pub fn mfcc_from_magnitude(&self, magnitude: &[f64]) -> Vec<f64> {
        let power: Vec<f64> = magnitude.iter().map(|m| m * m).collect();
        let log_energy: Vec<f64> = self
            .filter_bank
            .apply(&power)
            .into_iter()
            .map(|e| 10.0 * e.max(self.log_floor).log10())
            .collect();
        self.dct.transform(&log_energy)
    }
}
