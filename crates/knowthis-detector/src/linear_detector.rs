use crate::detector_trait::Detector;
use crate::policy::{check_layout, resolve, DecisionPolicy, EvidenceGate};
use knowthis_core::{
    AnalysisConfig, ConfigError, FeatureGroup, Fingerprint, FingerprintLayout, InternalError,
    LinearGroupConfig, SubScores, Verdict,
};
use std::sync::Arc;

/// Sub-scores this far from 0.5 earn a reason line.
const CONFIDENT_MARGIN: f64 = 0.4;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone)]
struct GroupModel {
    bias: f64,
    terms: Vec<(usize, f64)>,
}

impl GroupModel {
    fn resolve(config: &LinearGroupConfig, layout: &FingerprintLayout) -> Result<Self, ConfigError> {
        let terms = config
            .weights
            .iter()
            .map(|(key, weight)| Ok((resolve(layout, key)?, *weight)))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self {
            bias: config.bias,
            terms,
        })
    }

    fn score(&self, values: &[f64]) -> f64 {
        let z = self.bias + self.terms.iter().map(|(i, w)| w * values[*i]).sum::<f64>();
        sigmoid(z)
    }
}

/// Logistic model per feature group with coefficients fitted offline.
pub struct LinearDetector {
    layout: Arc<FingerprintLayout>,
    cepstral: GroupModel,
    spectral: GroupModel,
    pitch: GroupModel,
    gate: EvidenceGate,
    policy: DecisionPolicy,
}

impl LinearDetector {
    pub fn new(config: &AnalysisConfig, layout: Arc<FingerprintLayout>) -> Result<Self, ConfigError> {
        let linear = &config.detector.linear;
        Ok(Self {
            cepstral: GroupModel::resolve(&linear.cepstral, &layout)?,
            spectral: GroupModel::resolve(&linear.spectral, &layout)?,
            pitch: GroupModel::resolve(&linear.pitch, &layout)?,
            gate: EvidenceGate::new(&config.detector, &layout)?,
            policy: DecisionPolicy::from_config(&config.detector),
            layout,
        })
    }
}

impl Detector for LinearDetector {
    fn name(&self) -> &str {
        "linear"
    }

    fn detect(&self, fingerprint: &Fingerprint) -> Result<Verdict, InternalError> {
        check_layout(&self.layout, fingerprint)?;
        if self.gate.is_silent(fingerprint) {
            return self.policy.verdict(
                SubScores::neutral(),
                vec!["clip is near-silent; no usable voice evidence".to_string()],
                self.name(),
            );
        }

        let values = fingerprint.values();
        let mut reasons = Vec::new();
        let pitch = if self.gate.pitch_unreliable(fingerprint) {
            reasons.push("too few voiced frames for pitch analysis".to_string());
            0.5
        } else {
            self.pitch.score(values)
        };
        let subscores = SubScores {
            cepstral: self.cepstral.score(values),
            spectral: self.spectral.score(values),
            pitch,
        };

        for (group, score) in subscores.iter() {
            if score >= 0.5 + CONFIDENT_MARGIN {
                reasons.push(format!("{group} model indicates synthetic speech ({score:.2})"));
            } else if score <= 0.5 - CONFIDENT_MARGIN {
                reasons.push(format!("{group} model indicates human speech ({score:.2})"));
            }
        }
        self.policy.verdict(subscores, reasons, self.name())
    }
}
