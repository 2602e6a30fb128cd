use knowthis_core::{
    ConfigError, DetectorConfig, DetectorWeights, FeatureGroup, Fingerprint, FingerprintLayout,
    InternalError, Label, SubScores, Verdict,
};
use std::sync::Arc;

pub const MAX_REASONS: usize = 5;

/// Weighted combination of sub-scores and the threshold label rule.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionPolicy {
    weights: DetectorWeights,
    low_threshold: f64,
    high_threshold: f64,
}

impl DecisionPolicy {
    pub fn new(weights: DetectorWeights, low_threshold: f64, high_threshold: f64) -> Self {
        Self {
            weights,
            low_threshold,
            high_threshold,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.weights, config.low_threshold, config.high_threshold)
    }

    pub fn weights(&self) -> &DetectorWeights {
        &self.weights
    }

    pub fn weight(&self, group: FeatureGroup) -> f64 {
        match group {
            FeatureGroup::Cepstral => self.weights.cepstral,
            FeatureGroup::Spectral => self.weights.spectral,
            FeatureGroup::Pitch => self.weights.pitch,
        }
    }

    pub fn combine(&self, subscores: &SubScores) -> f64 {
        subscores
            .iter()
            .map(|(group, score)| self.weight(group) * score)
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }

    pub fn label(&self, score: f64) -> Label {
        if score >= self.high_threshold {
            Label::Ai
        } else if score <= self.low_threshold {
            Label::Human
        } else {
            Label::Uncertain
        }
    }

    /// Clamp sub-scores, combine, label. Non-finite sub-scores are a defect.
    pub fn verdict(
        &self,
        subscores: SubScores,
        mut reasons: Vec<String>,
        detector: &str,
    ) -> Result<Verdict, InternalError> {
        if let Some((group, _)) = subscores.iter().find(|(_, s)| !s.is_finite()) {
            return Err(InternalError::NonFinite {
                stage: "detector".to_string(),
                feature: format!("{group}_score"),
            });
        }
        let subscores = SubScores {
            cepstral: subscores.cepstral.clamp(0.0, 1.0),
            spectral: subscores.spectral.clamp(0.0, 1.0),
            pitch: subscores.pitch.clamp(0.0, 1.0),
        };
        let score = self.combine(&subscores);
        reasons.truncate(MAX_REASONS);
        Ok(Verdict {
            score,
            label: self.label(score),
            subscores,
            reasons,
            detector: detector.to_string(),
        })
    }
}

/// Evidence checks shared by every detector: near-silent clips and clips
/// with too few voiced frames for the pitch contour to mean anything.
#[derive(Debug, Clone)]
pub struct EvidenceGate {
    rms_mean: usize,
    voiced_ratio: usize,
    silence_rms: f64,
    min_voiced_ratio: f64,
}

impl EvidenceGate {
    pub fn new(config: &DetectorConfig, layout: &FingerprintLayout) -> Result<Self, ConfigError> {
        Ok(Self {
            rms_mean: resolve(layout, "rms.mean")?,
            voiced_ratio: resolve(layout, "f0.voiced_ratio")?,
            silence_rms: config.silence_rms,
            min_voiced_ratio: config.min_voiced_ratio,
        })
    }

    pub fn is_silent(&self, fingerprint: &Fingerprint) -> bool {
        fingerprint.values()[self.rms_mean] < self.silence_rms
    }

    pub fn pitch_unreliable(&self, fingerprint: &Fingerprint) -> bool {
        fingerprint.values()[self.voiced_ratio] < self.min_voiced_ratio
    }
}

pub fn resolve(layout: &FingerprintLayout, key: &str) -> Result<usize, ConfigError> {
    layout
        .index_of(key)
        .ok_or_else(|| ConfigError::UnknownFingerprintKey(key.to_string()))
}

/// Fingerprints must come from the layout the detector resolved its keys against.
pub fn check_layout(
    expected: &Arc<FingerprintLayout>,
    fingerprint: &Fingerprint,
) -> Result<(), InternalError> {
    if Arc::ptr_eq(expected, fingerprint.layout()) || **expected == **fingerprint.layout() {
        Ok(())
    } else {
        Err(InternalError::ShapeMismatch(format!(
            "fingerprint has {} keys, detector expects {}",
            fingerprint.len(),
            expected.len()
        )))
    }
}
