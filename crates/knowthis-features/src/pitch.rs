use knowthis_core::{AnalysisConfig, FeatureGroup, Frame};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    pub f0_hz: f64,
    pub voicing_confidence: f64,
}

impl PitchEstimate {
    pub const UNVOICED: PitchEstimate = PitchEstimate {
        f0_hz: 0.0,
        voicing_confidence: 0.0,
    };

    pub fn is_voiced(&self) -> bool {
        self.f0_hz > 0.0
    }

    pub fn to_row(&self) -> Vec<f64> {
        vec![self.f0_hz, self.voicing_confidence]
    }
}

/// Autocorrelation pitch tracker restricted to a lag range.
///
/// Each lag is scored with the normalized cross-correlation between the
/// frame's head and its shifted tail, so the score does not decay with lag.
/// The shortest lag whose score reaches `peak_tolerance` of the best one wins,
/// which keeps period doubling from being reported as the fundamental.
#[derive(Debug, Clone)]
pub struct PitchExtractor {
    sample_rate: u32,
    min_hz: f64,
    max_hz: f64,
    min_lag: usize,
    max_lag: usize,
    voicing_threshold: f64,
    peak_tolerance: f64,
    silence_rms: f64,
    names: Vec<String>,
}

impl PitchExtractor {
    pub fn new(config: &AnalysisConfig) -> Self {
        let p = &config.pitch;
        let (min_lag, max_lag) = lags_for(config.decoder.sample_rate, p.min_hz, p.max_hz);
        Self {
            sample_rate: config.decoder.sample_rate,
            min_hz: p.min_hz,
            max_hz: p.max_hz,
            min_lag,
            max_lag,
            voicing_threshold: p.voicing_threshold,
            peak_tolerance: p.peak_tolerance,
            silence_rms: p.silence_rms,
            names: FeatureGroup::Pitch.feature_names(config),
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Lag range at the configured analysis rate.
    pub fn lag_range(&self) -> (usize, usize) {
        (self.min_lag, self.max_lag)
    }

    /// Estimate f0 of a frame sampled at `sample_rate`. The search range is
    /// rebuilt from the configured pitch bounds when the rate differs from
    /// the analysis rate.
    pub fn extract_pitch(&self, frame: &Frame, sample_rate: u32) -> PitchEstimate {
        if sample_rate == 0 {
            return PitchEstimate::UNVOICED;
        }
        let (min_lag, max_lag) = if sample_rate == self.sample_rate {
            (self.min_lag, self.max_lag)
        } else {
            lags_for(sample_rate, self.min_hz, self.max_hz)
        };

        let n = frame.raw.len();
        let max_lag = max_lag.min(n.saturating_sub(2));
        if n < 4 || max_lag <= min_lag {
            return PitchEstimate::UNVOICED;
        }

        let mean = frame.raw.iter().map(|&s| s as f64).sum::<f64>() / n as f64;
        let x: Vec<f64> = frame.raw.iter().map(|&s| s as f64 - mean).collect();
        let energy: f64 = x.iter().map(|v| v * v).sum();
        if (energy / n as f64).sqrt() < self.silence_rms {
            return PitchEstimate::UNVOICED;
        }

        // prefix[i] = energy of x[..i]; gives both window energies per lag in O(1).
        let mut prefix = Vec::with_capacity(n + 1);
        prefix.push(0.0);
        for v in &x {
            prefix.push(prefix[prefix.len() - 1] + v * v);
        }

        // Scores for lags min_lag-1 ..= max_lag+1 so every candidate has both neighbours.
        let lo = min_lag - 1;
        let hi = (max_lag + 1).min(n - 1);
        let scores: Vec<f64> = (lo..=hi)
            .map(|lag| normalized_correlation(&x, &prefix, lag))
            .collect();
        let at = |lag: usize| scores[lag - lo];

        let best = (min_lag..=max_lag)
            .map(at)
            .fold(f64::NEG_INFINITY, f64::max);
        if best < self.voicing_threshold {
            return PitchEstimate::UNVOICED;
        }

        let threshold = self.peak_tolerance * best;
        let chosen = (min_lag..=max_lag)
            .find(|&lag| {
                let r = at(lag);
                r >= threshold && r >= at(lag - 1) && r >= at(lag + 1)
            })
            .unwrap_or_else(|| {
                (min_lag..=max_lag)
                    .find(|&lag| at(lag) == best)
                    .unwrap_or(min_lag)
            });

        let (a, b, c) = (at(chosen - 1), at(chosen), at(chosen + 1));
        let curvature = a - 2.0 * b + c;
        let offset = if curvature.abs() > f64::EPSILON {
            (0.5 * (a - c) / curvature).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        let period = chosen as f64 + offset;

        PitchEstimate {
            f0_hz: sample_rate as f64 / period,
            voicing_confidence: b.clamp(0.0, 1.0),
        }
    }
}

fn lags_for(sample_rate: u32, min_hz: f64, max_hz: f64) -> (usize, usize) {
    let rate = sample_rate as f64;
    let min_lag = ((rate / max_hz).floor() as usize).max(2);
    let max_lag = ((rate / min_hz).ceil() as usize).max(min_lag);
    (min_lag, max_lag)
}

fn normalized_correlation(x: &[f64], prefix: &[f64], lag: usize) -> f64 {
    let n = x.len();
    let cross: f64 = x[..n - lag].iter().zip(&x[lag..]).map(|(a, b)| a * b).sum();
    let head_energy = prefix[n - lag];
    let tail_energy = (prefix[n] - prefix[lag]).max(0.0);
    let denom = (head_energy * tail_energy).sqrt();
    if denom > f64::EPSILON {
        (cross / denom).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(raw: Vec<f32>) -> Frame {
        Frame {
            index: 0,
            start: 0,
            windowed: raw.clone(),
            raw,
        }
    }

    fn tone(freq: f64, rate: f64, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| ((2.0 * std::f64::consts::PI * freq * i as f64 / rate).sin() * 0.5) as f32)
            .collect()
    }

    #[test]
    fn test_lag_range_from_config() {
        let extractor = PitchExtractor::new(&AnalysisConfig::default());
        assert_eq!(extractor.lag_range(), (32, 320));
    }

    #[test]
    fn test_pitch_of_pure_tone() {
        let extractor = PitchExtractor::new(&AnalysisConfig::default());
        for freq in [110.0, 200.0, 333.0] {
            let estimate = extractor.extract_pitch(&frame_of(tone(freq, 16000.0, 1024)), 16000);
            assert!(
                (estimate.f0_hz - freq).abs() / freq < 0.01,
                "{freq} Hz estimated as {}",
                estimate.f0_hz
            );
            assert!(estimate.voicing_confidence > 0.9);
        }
    }

    #[test]
    fn test_pitch_prefers_fundamental_over_multiples() {
        // Strong second harmonic still reports the 150 Hz fundamental.
        let raw: Vec<f32> = (0..1024)
            .map(|i| {
                let t = i as f64 / 16000.0;
                let w = 2.0 * std::f64::consts::PI * 150.0 * t;
                (0.3 * w.sin() + 0.5 * (2.0 * w).sin()) as f32
            })
            .collect();
        let extractor = PitchExtractor::new(&AnalysisConfig::default());
        let estimate = extractor.extract_pitch(&frame_of(raw), 16000);
        assert!((estimate.f0_hz - 150.0).abs() < 3.0, "{:?}", estimate);
    }

    #[test]
    fn test_pitch_follows_frame_sample_rate() {
        // 2048 samples at 44.1 kHz still hold two periods of 50 Hz.
        let extractor = PitchExtractor::new(&AnalysisConfig::default());
        let frame = frame_of(tone(220.0, 44100.0, 2048));
        let estimate = extractor.extract_pitch(&frame, 44100);
        assert!((estimate.f0_hz - 220.0).abs() / 220.0 < 0.01, "{:?}", estimate);

        // The same samples read at the analysis rate land elsewhere.
        let misread = extractor.extract_pitch(&frame, 16000);
        assert!((misread.f0_hz - 220.0).abs() > 50.0, "{:?}", misread);
    }

    #[test]
    fn test_zero_sample_rate_is_unvoiced() {
        let extractor = PitchExtractor::new(&AnalysisConfig::default());
        let estimate = extractor.extract_pitch(&frame_of(tone(200.0, 16000.0, 1024)), 0);
        assert_eq!(estimate, PitchEstimate::UNVOICED);
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let extractor = PitchExtractor::new(&AnalysisConfig::default());
        let estimate = extractor.extract_pitch(&frame_of(vec![0.0; 1024]), 16000);
        assert_eq!(estimate, PitchEstimate::UNVOICED);
        assert!(!estimate.is_voiced());
    }

    #[test]
    fn test_noise_is_unvoiced() {
        let mut state = 987654321u32;
        let raw: Vec<f32> = (0..1024)
            .map(|_| {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                ((state >> 8) as f32 / (1u32 << 24) as f32) * 2.0 - 1.0
            })
            .collect();
        let extractor = PitchExtractor::new(&AnalysisConfig::default());
        let estimate = extractor.extract_pitch(&frame_of(raw), 16000);
        assert_eq!(estimate, PitchEstimate::UNVOICED);
    }
}
