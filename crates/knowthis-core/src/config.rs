use crate::error::ConfigError;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub decoder: DecoderConfig,

    #[serde(default)]
    pub framing: FramingConfig,

    #[serde(default)]
    pub cepstral: CepstralConfig,

    #[serde(default)]
    pub spectral: SpectralConfig,

    #[serde(default)]
    pub pitch: PitchConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DecoderConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_min_duration_ms")]
    pub min_duration_ms: u64,

    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: f64,

    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: usize,

    #[serde(default = "default_accepted_extensions")]
    pub accepted_extensions: Vec<String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            min_duration_ms: default_min_duration_ms(),
            max_duration_secs: default_max_duration_secs(),
            max_input_bytes: default_max_input_bytes(),
            accepted_extensions: default_accepted_extensions(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    #[default]
    Hann,
    Hamming,
    Rectangular,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FramingConfig {
    #[serde(default = "default_frame_length")]
    pub frame_length: usize,

    #[serde(default = "default_hop_length")]
    pub hop_length: usize,

    #[serde(default)]
    pub window: WindowKind,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            frame_length: default_frame_length(),
            hop_length: default_hop_length(),
            window: WindowKind::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CepstralConfig {
    #[serde(default = "default_num_coefficients")]
    pub num_coefficients: usize,

    #[serde(default = "default_num_bands")]
    pub num_bands: usize,

    #[serde(default)]
    pub low_freq_hz: f64,

    /// Upper edge of the filter bank; Nyquist when absent.
    #[serde(default)]
    pub high_freq_hz: Option<f64>,

    #[serde(default = "default_log_floor")]
    pub log_floor: f64,
}

impl Default for CepstralConfig {
    fn default() -> Self {
        Self {
            num_coefficients: default_num_coefficients(),
            num_bands: default_num_bands(),
            low_freq_hz: 0.0,
            high_freq_hz: None,
            log_floor: default_log_floor(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpectralConfig {
    #[serde(default = "default_rolloff_fraction")]
    pub rolloff_fraction: f64,

    /// Total magnitude below which a frame counts as silent.
    #[serde(default = "default_spectral_silence")]
    pub silence_threshold: f64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            rolloff_fraction: default_rolloff_fraction(),
            silence_threshold: default_spectral_silence(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PitchConfig {
    #[serde(default = "default_pitch_min_hz")]
    pub min_hz: f64,

    #[serde(default = "default_pitch_max_hz")]
    pub max_hz: f64,

    /// Minimum normalized autocorrelation peak for a frame to count as voiced.
    #[serde(default = "default_voicing_threshold")]
    pub voicing_threshold: f64,

    /// A shorter lag wins over the global peak if it reaches this fraction of it.
    #[serde(default = "default_peak_tolerance")]
    pub peak_tolerance: f64,

    #[serde(default = "default_pitch_silence_rms")]
    pub silence_rms: f64,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            min_hz: default_pitch_min_hz(),
            max_hz: default_pitch_max_hz(),
            voicing_threshold: default_voicing_threshold(),
            peak_tolerance: default_peak_tolerance(),
            silence_rms: default_pitch_silence_rms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_engine")]
    pub engine: String,

    #[serde(default = "default_low_threshold")]
    pub low_threshold: f64,

    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,

    #[serde(default)]
    pub weights: DetectorWeights,

    /// Mean frame RMS below which the clip carries no usable evidence.
    #[serde(default = "default_detector_silence_rms")]
    pub silence_rms: f64,

    #[serde(default = "default_min_voiced_ratio")]
    pub min_voiced_ratio: f64,

    #[serde(default)]
    pub rule: RuleConfig,

    #[serde(default)]
    pub linear: LinearConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            low_threshold: default_low_threshold(),
            high_threshold: default_high_threshold(),
            weights: DetectorWeights::default(),
            silence_rms: default_detector_silence_rms(),
            min_voiced_ratio: default_min_voiced_ratio(),
            rule: RuleConfig::default(),
            linear: LinearConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct DetectorWeights {
    #[serde(default = "default_cepstral_weight")]
    pub cepstral: f64,

    #[serde(default = "default_spectral_weight")]
    pub spectral: f64,

    #[serde(default = "default_pitch_weight")]
    pub pitch: f64,
}

impl Default for DetectorWeights {
    fn default() -> Self {
        Self {
            cepstral: default_cepstral_weight(),
            spectral: default_spectral_weight(),
            pitch: default_pitch_weight(),
        }
    }
}

/// Reference points of one indicator: fully AI-like at `ai`, fully human-like at `human`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct Ramp {
    pub ai: f64,
    pub human: f64,
}

impl Ramp {
    pub const fn new(ai: f64, human: f64) -> Self {
        Self { ai, human }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuleConfig {
    #[serde(default = "default_mfcc_std")]
    pub mfcc_std: Ramp,

    #[serde(default = "default_mfcc_delta")]
    pub mfcc_delta: Ramp,

    #[serde(default = "default_centroid_std")]
    pub centroid_std: Ramp,

    #[serde(default = "default_zcr_std")]
    pub zcr_std: Ramp,

    #[serde(default = "default_rms_std")]
    pub rms_std: Ramp,

    #[serde(default = "default_flatness_mean")]
    pub flatness_mean: Ramp,

    #[serde(default = "default_f0_cv")]
    pub f0_cv: Ramp,

    #[serde(default = "default_f0_delta_ratio")]
    pub f0_delta_ratio: Ramp,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            mfcc_std: default_mfcc_std(),
            mfcc_delta: default_mfcc_delta(),
            centroid_std: default_centroid_std(),
            zcr_std: default_zcr_std(),
            rms_std: default_rms_std(),
            flatness_mean: default_flatness_mean(),
            f0_cv: default_f0_cv(),
            f0_delta_ratio: default_f0_delta_ratio(),
        }
    }
}

impl RuleConfig {
    fn ramps(&self) -> [(&'static str, Ramp); 8] {
        [
            ("mfcc_std", self.mfcc_std),
            ("mfcc_delta", self.mfcc_delta),
            ("centroid_std", self.centroid_std),
            ("zcr_std", self.zcr_std),
            ("rms_std", self.rms_std),
            ("flatness_mean", self.flatness_mean),
            ("f0_cv", self.f0_cv),
            ("f0_delta_ratio", self.f0_delta_ratio),
        ]
    }
}

/// Offline-fitted logistic coefficients, one model per feature group.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LinearConfig {
    #[serde(default)]
    pub cepstral: LinearGroupConfig,

    #[serde(default)]
    pub spectral: LinearGroupConfig,

    #[serde(default)]
    pub pitch: LinearGroupConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LinearGroupConfig {
    #[serde(default)]
    pub bias: f64,

    /// Fingerprint key (e.g. `"mfcc_1.std"`) to coefficient.
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parallel: default_true(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_min_duration_ms() -> u64 {
    300
}

fn default_max_duration_secs() -> f64 {
    60.0
}

fn default_max_input_bytes() -> usize {
    25 * 1024 * 1024
}

fn default_accepted_extensions() -> Vec<String> {
    ["wav", "mp3", "m4a", "aac", "flac", "ogg"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_frame_length() -> usize {
    1024
}

fn default_hop_length() -> usize {
    256
}

fn default_num_coefficients() -> usize {
    13
}

fn default_num_bands() -> usize {
    26
}

fn default_log_floor() -> f64 {
    1e-10
}

fn default_rolloff_fraction() -> f64 {
    0.85
}

fn default_spectral_silence() -> f64 {
    1e-6
}

fn default_pitch_min_hz() -> f64 {
    50.0
}

fn default_pitch_max_hz() -> f64 {
    500.0
}

fn default_voicing_threshold() -> f64 {
    0.45
}

fn default_peak_tolerance() -> f64 {
    0.9
}

fn default_pitch_silence_rms() -> f64 {
    1e-4
}

fn default_engine() -> String {
    "rule".to_string()
}

fn default_low_threshold() -> f64 {
    0.35
}

fn default_high_threshold() -> f64 {
    0.65
}

fn default_detector_silence_rms() -> f64 {
    1e-3
}

fn default_min_voiced_ratio() -> f64 {
    0.1
}

fn default_cepstral_weight() -> f64 {
    0.4
}

fn default_spectral_weight() -> f64 {
    0.3
}

fn default_pitch_weight() -> f64 {
    0.3
}

fn default_mfcc_std() -> Ramp {
    Ramp::new(15.0, 25.0)
}

fn default_mfcc_delta() -> Ramp {
    Ramp::new(1.5, 5.0)
}

fn default_centroid_std() -> Ramp {
    Ramp::new(150.0, 400.0)
}

fn default_zcr_std() -> Ramp {
    Ramp::new(0.005, 0.02)
}

fn default_rms_std() -> Ramp {
    Ramp::new(0.002, 0.01)
}

fn default_flatness_mean() -> Ramp {
    Ramp::new(0.5, 0.15)
}

fn default_f0_cv() -> Ramp {
    Ramp::new(0.02, 0.10)
}

fn default_f0_delta_ratio() -> Ramp {
    Ramp::new(0.005, 0.03)
}

fn default_true() -> bool {
    true
}

/// Interpolate `${VAR}` patterns with environment variable values.
/// Whole-line `#` comments are copied through untouched.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::Invalid(e.to_string()))?;
    let mut result = String::with_capacity(input.len());
    let mut errors = Vec::new();

    for line in input.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            continue;
        }
        let mut interpolated = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(val) => {
                    interpolated = interpolated.replace(&cap[0], &val);
                }
                Err(_) => {
                    errors.push(var_name.to_string());
                }
            }
        }
        result.push_str(&interpolated);
    }

    if let Some(first_missing) = errors.into_iter().next() {
        return Err(ConfigError::EnvVarNotFound(first_missing));
    }

    Ok(result)
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

impl AnalysisConfig {
    /// Load configuration from a TOML file, with environment variable interpolation.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(s)?;
        let config: AnalysisConfig = toml::from_str(&interpolated)?;
        config.validate()?;
        Ok(config)
    }

    /// Upper edge of the analysed band.
    pub fn nyquist_hz(&self) -> f64 {
        self.decoder.sample_rate as f64 / 2.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.decoder;
        if d.sample_rate == 0 {
            return Err(invalid("decoder.sample_rate must be > 0"));
        }
        if d.max_input_bytes == 0 {
            return Err(invalid("decoder.max_input_bytes must be > 0"));
        }
        if !(d.max_duration_secs > 0.0) || (d.min_duration_ms as f64 / 1000.0) >= d.max_duration_secs
        {
            return Err(invalid(format!(
                "decoder.min_duration_ms ({}) must be below decoder.max_duration_secs ({})",
                d.min_duration_ms, d.max_duration_secs
            )));
        }

        let f = &self.framing;
        if f.frame_length == 0 || f.hop_length == 0 {
            return Err(invalid("framing.frame_length and framing.hop_length must be > 0"));
        }
        if f.hop_length > f.frame_length {
            return Err(invalid(format!(
                "framing.hop_length ({}) must not exceed framing.frame_length ({})",
                f.hop_length, f.frame_length
            )));
        }

        let nyquist = self.nyquist_hz();
        let c = &self.cepstral;
        if c.num_bands == 0 || c.num_coefficients == 0 {
            return Err(invalid("cepstral.num_bands and cepstral.num_coefficients must be > 0"));
        }
        if c.num_coefficients > c.num_bands {
            return Err(invalid(format!(
                "cepstral.num_coefficients ({}) must not exceed cepstral.num_bands ({})",
                c.num_coefficients, c.num_bands
            )));
        }
        let high = c.high_freq_hz.unwrap_or(nyquist);
        if c.low_freq_hz < 0.0 || high <= c.low_freq_hz || high > nyquist {
            return Err(invalid(format!(
                "cepstral band {}..{} Hz must lie within 0..{} Hz",
                c.low_freq_hz, high, nyquist
            )));
        }
        if !(c.log_floor > 0.0) {
            return Err(invalid("cepstral.log_floor must be > 0"));
        }

        let s = &self.spectral;
        if !(s.rolloff_fraction > 0.0 && s.rolloff_fraction <= 1.0) {
            return Err(invalid("spectral.rolloff_fraction must be in (0, 1]"));
        }
        if s.silence_threshold < 0.0 {
            return Err(invalid("spectral.silence_threshold must be >= 0"));
        }

        let p = &self.pitch;
        if !(p.min_hz > 0.0) || p.min_hz >= p.max_hz || p.max_hz >= nyquist {
            return Err(invalid(format!(
                "pitch range {}..{} Hz must be increasing, positive and below {} Hz",
                p.min_hz, p.max_hz, nyquist
            )));
        }
        let max_lag = (d.sample_rate as f64 / p.min_hz).ceil() as usize;
        if max_lag >= f.frame_length {
            return Err(invalid(format!(
                "framing.frame_length ({}) must exceed the longest pitch period ({} samples)",
                f.frame_length, max_lag
            )));
        }
        for (name, v) in [
            ("pitch.voicing_threshold", p.voicing_threshold),
            ("pitch.peak_tolerance", p.peak_tolerance),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(invalid(format!("{name} must be in [0, 1]")));
            }
        }

        let det = &self.detector;
        for (name, v) in [
            ("detector.low_threshold", det.low_threshold),
            ("detector.high_threshold", det.high_threshold),
            ("detector.min_voiced_ratio", det.min_voiced_ratio),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(invalid(format!("{name} must be in [0, 1]")));
            }
        }
        if det.low_threshold > det.high_threshold {
            return Err(invalid(format!(
                "detector.low_threshold ({}) must not exceed detector.high_threshold ({})",
                det.low_threshold, det.high_threshold
            )));
        }
        let w = &det.weights;
        if w.cepstral < 0.0 || w.spectral < 0.0 || w.pitch < 0.0 {
            return Err(invalid("detector.weights must be non-negative"));
        }
        let sum = w.cepstral + w.spectral + w.pitch;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(invalid(format!("detector.weights must sum to 1, got {sum}")));
        }
        for (name, ramp) in det.rule.ramps() {
            if !ramp.ai.is_finite() || !ramp.human.is_finite() || ramp.ai == ramp.human {
                return Err(invalid(format!(
                    "detector.rule.{name} needs distinct finite ai/human points"
                )));
            }
        }

        Ok(())
    }
}
