use crate::config::AnalysisConfig;
use crate::error::{DecodeError, InternalError};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Mono PCM clip at the analysis sample rate, samples in [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    samples: Arc<[f32]>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Result<Self, DecodeError> {
        if samples.is_empty() {
            return Err(DecodeError::Empty);
        }
        if sample_rate == 0 {
            return Err(DecodeError::Corrupt("sample rate is zero".to_string()));
        }
        let samples: Arc<[f32]> = samples
            .into_iter()
            .map(|s| if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 })
            .collect();
        Ok(Self {
            sample_rate,
            samples,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// One analysis window. `raw` is the untouched slice (zero-padded past the
/// end of the clip), `windowed` has the taper applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: usize,
    pub start: usize,
    pub raw: Vec<f32>,
    pub windowed: Vec<f32>,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureGroup {
    Cepstral,
    Spectral,
    Pitch,
}

impl FeatureGroup {
    pub const ALL: [FeatureGroup; 3] = [
        FeatureGroup::Cepstral,
        FeatureGroup::Spectral,
        FeatureGroup::Pitch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureGroup::Cepstral => "cepstral",
            FeatureGroup::Spectral => "spectral",
            FeatureGroup::Pitch => "pitch",
        }
    }
}

/// Per-frame features of the spectral group, in fingerprint order.
pub const SPECTRAL_FEATURES: [&str; 6] = [
    "spectral_centroid",
    "spectral_bandwidth",
    "spectral_rolloff",
    "spectral_flatness",
    "zero_crossing_rate",
    "rms",
];

pub const PITCH_FEATURES: [&str; 2] = ["f0", "voicing_confidence"];

/// Feature whose voiced frames feed the contour reductions.
pub const CONTOUR_FEATURE: &str = "f0";

impl FeatureGroup {
    /// Per-frame feature names this group emits under `config`.
    pub fn feature_names(&self, config: &AnalysisConfig) -> Vec<String> {
        match self {
            FeatureGroup::Cepstral => (0..config.cepstral.num_coefficients)
                .map(|k| format!("mfcc_{k}"))
                .collect(),
            FeatureGroup::Spectral => SPECTRAL_FEATURES.iter().map(|s| s.to_string()).collect(),
            FeatureGroup::Pitch => PITCH_FEATURES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl fmt::Display for FeatureGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-frame rows produced by one extractor. Every row has one value per name.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStream {
    pub group: FeatureGroup,
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureStream {
    pub fn new(group: FeatureGroup, names: Vec<String>) -> Self {
        Self {
            group,
            names,
            rows: Vec::new(),
        }
    }

    /// Append one frame's values. Rejects wrong widths and non-finite values.
    pub fn push(&mut self, row: Vec<f64>) -> Result<(), InternalError> {
        if row.len() != self.names.len() {
            return Err(InternalError::ShapeMismatch(format!(
                "{} row has {} values, expected {}",
                self.group,
                row.len(),
                self.names.len()
            )));
        }
        if let Some(i) = row.iter().position(|v| !v.is_finite()) {
            return Err(InternalError::NonFinite {
                stage: self.group.to_string(),
                feature: self.names[i].clone(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn frame(&self, index: usize) -> Option<FeatureVector<'_>> {
        self.rows.get(index).map(|values| FeatureVector {
            names: &self.names,
            values,
        })
    }

    pub fn frames(&self) -> impl Iterator<Item = FeatureVector<'_>> {
        self.rows.iter().map(move |values| FeatureVector {
            names: &self.names,
            values,
        })
    }

    /// All frames' values for one feature, in frame order.
    pub fn column(&self, feature: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |row| row[feature])
    }
}

/// Named view over one frame's features.
#[derive(Debug, Clone, Copy)]
pub struct FeatureVector<'a> {
    names: &'a [String],
    values: &'a [f64],
}

impl<'a> FeatureVector<'a> {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        let values = self.values;
        self.names
            .iter()
            .zip(values.iter())
            .map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reduction {
    Mean,
    Std,
    Delta,
    VoicedMean,
    VoicedStd,
    VoicedCv,
    VoicedDelta,
    VoicedRatio,
}

impl Reduction {
    /// Reductions applied to every per-frame feature, in fingerprint order.
    pub const PER_FEATURE: [Reduction; 3] = [Reduction::Mean, Reduction::Std, Reduction::Delta];

    /// Clip-level reductions over voiced f0 values, appended after the per-feature block.
    pub const CONTOUR: [Reduction; 5] = [
        Reduction::VoicedMean,
        Reduction::VoicedStd,
        Reduction::VoicedCv,
        Reduction::VoicedDelta,
        Reduction::VoicedRatio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Reduction::Mean => "mean",
            Reduction::Std => "std",
            Reduction::Delta => "delta",
            Reduction::VoicedMean => "voiced_mean",
            Reduction::VoicedStd => "voiced_std",
            Reduction::VoicedCv => "voiced_cv",
            Reduction::VoicedDelta => "voiced_delta",
            Reduction::VoicedRatio => "voiced_ratio",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FingerprintKey {
    pub group: FeatureGroup,
    pub feature: String,
    pub reduction: Reduction,
}

impl fmt::Display for FingerprintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.feature, self.reduction.as_str())
    }
}

/// Ordered key list shared by every fingerprint built under one configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintLayout {
    keys: Vec<FingerprintKey>,
    rendered: Vec<String>,
}

impl FingerprintLayout {
    pub fn new(keys: Vec<FingerprintKey>) -> Self {
        let rendered = keys.iter().map(|k| k.to_string()).collect();
        Self { keys, rendered }
    }

    /// Layout every clip analysed under `config` is reduced to.
    pub fn for_config(config: &AnalysisConfig) -> Self {
        let mut keys = Vec::new();
        for group in FeatureGroup::ALL {
            for feature in group.feature_names(config) {
                for reduction in Reduction::PER_FEATURE {
                    keys.push(FingerprintKey {
                        group,
                        feature: feature.clone(),
                        reduction,
                    });
                }
            }
        }
        for reduction in Reduction::CONTOUR {
            keys.push(FingerprintKey {
                group: FeatureGroup::Pitch,
                feature: CONTOUR_FEATURE.to_string(),
                reduction,
            });
        }
        Self::new(keys)
    }

    pub fn keys(&self) -> &[FingerprintKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Position of a rendered key such as `"mfcc_1.std"`.
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.rendered.iter().position(|k| k == key)
    }

    pub fn key_name(&self, index: usize) -> Option<&str> {
        self.rendered.get(index).map(|s| s.as_str())
    }

    /// Indices of `reduction` entries whose feature name starts with `prefix`.
    pub fn indices_with_prefix(&self, prefix: &str, reduction: Reduction) -> Vec<usize> {
        self.keys
            .iter()
            .enumerate()
            .filter(|(_, k)| k.reduction == reduction && k.feature.starts_with(prefix))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Fixed-length clip summary. Length depends on configuration only.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    layout: Arc<FingerprintLayout>,
    values: Vec<f64>,
}

impl Fingerprint {
    pub fn new(layout: Arc<FingerprintLayout>, values: Vec<f64>) -> Result<Self, InternalError> {
        if values.len() != layout.len() {
            return Err(InternalError::ShapeMismatch(format!(
                "fingerprint has {} values, layout has {} keys",
                values.len(),
                layout.len()
            )));
        }
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(InternalError::NonFinite {
                stage: "aggregate".to_string(),
                feature: layout.key_name(i).unwrap_or("?").to_string(),
            });
        }
        Ok(Self { layout, values })
    }

    pub fn layout(&self) -> &Arc<FingerprintLayout> {
        &self.layout
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.layout.index_of(key).map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        (0..self.values.len()).filter_map(move |i| {
            self.layout.key_name(i).map(|name| (name, self.values[i]))
        })
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, &value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Human,
    Ai,
    Uncertain,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Human => "human",
            Label::Ai => "ai",
            Label::Uncertain => "uncertain",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-group partial confidence that the clip is synthetic, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubScores {
    pub cepstral: f64,
    pub spectral: f64,
    pub pitch: f64,
}

impl SubScores {
    pub fn neutral() -> Self {
        Self {
            cepstral: 0.5,
            spectral: 0.5,
            pitch: 0.5,
        }
    }

    pub fn get(&self, group: FeatureGroup) -> f64 {
        match group {
            FeatureGroup::Cepstral => self.cepstral,
            FeatureGroup::Spectral => self.spectral,
            FeatureGroup::Pitch => self.pitch,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureGroup, f64)> + '_ {
        FeatureGroup::ALL.into_iter().map(move |g| (g, self.get(g)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub score: f64,
    pub label: Label,
    pub subscores: SubScores,
    pub reasons: Vec<String>,
    pub detector: String,
}
