use crate::detector_trait::Detector;
use crate::policy::{check_layout, resolve, DecisionPolicy, EvidenceGate};
use knowthis_core::{
    AnalysisConfig, ConfigError, FeatureGroup, Fingerprint, FingerprintLayout, InternalError,
    Ramp, Reduction, SubScores, Verdict,
};
use std::sync::Arc;
use tracing::debug;

/// Where an indicator reads its value from in the fingerprint.
#[derive(Debug, Clone)]
enum Source {
    Key(usize),
    MeanOf(Vec<usize>),
    /// `numerator / denominator`, 0 when the denominator is not positive.
    Ratio(usize, usize),
}

impl Source {
    fn read(&self, values: &[f64]) -> f64 {
        match self {
            Source::Key(i) => values[*i],
            Source::MeanOf(indices) => {
                indices.iter().map(|&i| values[i]).sum::<f64>() / indices.len() as f64
            }
            Source::Ratio(num, den) => {
                if values[*den] > 0.0 {
                    values[*num] / values[*den]
                } else {
                    0.0
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Indicator {
    name: &'static str,
    group: FeatureGroup,
    ramp: Ramp,
    source: Source,
    ai_reason: &'static str,
    human_reason: &'static str,
}

impl Indicator {
    /// 1.0 at or past the AI reference point, 0.0 at or past the human one.
    fn score(&self, value: f64) -> f64 {
        ((value - self.ramp.human) / (self.ramp.ai - self.ramp.human)).clamp(0.0, 1.0)
    }
}

/// Hand-tuned thresholds over variability and stability statistics.
///
/// Each sub-score is the mean of its group's indicator ramps.
pub struct RuleDetector {
    layout: Arc<FingerprintLayout>,
    indicators: Vec<Indicator>,
    gate: EvidenceGate,
    policy: DecisionPolicy,
}

impl RuleDetector {
    pub fn new(config: &AnalysisConfig, layout: Arc<FingerprintLayout>) -> Result<Self, ConfigError> {
        let rule = &config.detector.rule;
        let mean_of = |prefix: &str, reduction: Reduction| -> Result<Source, ConfigError> {
            let indices = layout.indices_with_prefix(prefix, reduction);
            if indices.is_empty() {
                return Err(ConfigError::UnknownFingerprintKey(format!(
                    "{prefix}*.{}",
                    reduction.as_str()
                )));
            }
            Ok(Source::MeanOf(indices))
        };

        let indicators = vec![
            Indicator {
                name: "mfcc_std",
                group: FeatureGroup::Cepstral,
                ramp: rule.mfcc_std,
                source: mean_of("mfcc_", Reduction::Std)?,
                ai_reason: "unusually uniform vocal timbre (low MFCC variation)",
                human_reason: "natural timbre variation across the clip",
            },
            Indicator {
                name: "mfcc_delta",
                group: FeatureGroup::Cepstral,
                ramp: rule.mfcc_delta,
                source: mean_of("mfcc_", Reduction::Delta)?,
                ai_reason: "overly smooth frame-to-frame timbre transitions",
                human_reason: "irregular frame-to-frame timbre transitions",
            },
            Indicator {
                name: "centroid_std",
                group: FeatureGroup::Spectral,
                ramp: rule.centroid_std,
                source: Source::Key(resolve(&layout, "spectral_centroid.std")?),
                ai_reason: "very stable spectral brightness",
                human_reason: "varying spectral brightness",
            },
            Indicator {
                name: "zcr_std",
                group: FeatureGroup::Spectral,
                ramp: rule.zcr_std,
                source: Source::Key(resolve(&layout, "zero_crossing_rate.std")?),
                ai_reason: "highly regular zero-crossing pattern",
                human_reason: "irregular zero-crossing pattern",
            },
            Indicator {
                name: "rms_std",
                group: FeatureGroup::Spectral,
                ramp: rule.rms_std,
                source: Source::Key(resolve(&layout, "rms.std")?),
                ai_reason: "homogeneous loudness throughout the clip",
                human_reason: "natural loudness dynamics",
            },
            Indicator {
                name: "flatness_mean",
                group: FeatureGroup::Spectral,
                ramp: rule.flatness_mean,
                source: Source::Key(resolve(&layout, "spectral_flatness.mean")?),
                ai_reason: "noise-like flat spectrum",
                human_reason: "peaked, harmonic spectrum",
            },
            Indicator {
                name: "f0_cv",
                group: FeatureGroup::Pitch,
                ramp: rule.f0_cv,
                source: Source::Key(resolve(&layout, "f0.voiced_cv")?),
                ai_reason: "abnormally low pitch variance",
                human_reason: "natural pitch variance",
            },
            Indicator {
                name: "f0_delta_ratio",
                group: FeatureGroup::Pitch,
                ramp: rule.f0_delta_ratio,
                source: Source::Ratio(
                    resolve(&layout, "f0.voiced_delta")?,
                    resolve(&layout, "f0.voiced_mean")?,
                ),
                ai_reason: "unnaturally smooth pitch contour",
                human_reason: "natural pitch movement",
            },
        ];

        Ok(Self {
            gate: EvidenceGate::new(&config.detector, &layout)?,
            policy: DecisionPolicy::from_config(&config.detector),
            layout,
            indicators,
        })
    }

    fn group_score(scores: &[(FeatureGroup, f64)], group: FeatureGroup) -> f64 {
        let (sum, count) = scores
            .iter()
            .filter(|(g, _)| *g == group)
            .fold((0.0, 0usize), |(s, n), (_, v)| (s + v, n + 1));
        if count == 0 {
            0.5
        } else {
            sum / count as f64
        }
    }
}

impl Detector for RuleDetector {
    fn name(&self) -> &str {
        "rule"
    }

    fn detect(&self, fingerprint: &Fingerprint) -> Result<Verdict, InternalError> {
        check_layout(&self.layout, fingerprint)?;

        if self.gate.is_silent(fingerprint) {
            debug!("clip below silence level, returning neutral verdict");
            return self.policy.verdict(
                SubScores::neutral(),
                vec!["clip is near-silent; no usable voice evidence".to_string()],
                self.name(),
            );
        }
        let skip_pitch = self.gate.pitch_unreliable(fingerprint);

        let values = fingerprint.values();
        let mut scored: Vec<(FeatureGroup, f64)> = Vec::with_capacity(self.indicators.len());
        let mut decisive: Vec<(f64, String)> = Vec::new();
        for indicator in &self.indicators {
            if skip_pitch && indicator.group == FeatureGroup::Pitch {
                continue;
            }
            let value = indicator.source.read(values);
            let score = indicator.score(value);
            debug!(indicator = indicator.name, value, score, "rule indicator");
            scored.push((indicator.group, score));

            // Distance past the reference point, in units of the ramp's span.
            let ramp = indicator.ramp;
            let position = (value - ramp.human) / (ramp.ai - ramp.human);
            let (past, text) = if score >= 1.0 {
                (position - 1.0, indicator.ai_reason)
            } else if score <= 0.0 {
                (-position, indicator.human_reason)
            } else {
                continue;
            };
            decisive.push((past, format!("{text} ({} = {value:.4})", indicator.name)));
        }

        decisive.sort_by(|a, b| b.0.total_cmp(&a.0));
        let mut reasons = Vec::with_capacity(decisive.len() + 1);
        if skip_pitch {
            reasons.push("too few voiced frames for pitch analysis".to_string());
        }
        reasons.extend(decisive.into_iter().map(|(_, r)| r));

        let subscores = SubScores {
            cepstral: Self::group_score(&scored, FeatureGroup::Cepstral),
            spectral: Self::group_score(&scored, FeatureGroup::Spectral),
            pitch: Self::group_score(&scored, FeatureGroup::Pitch),
        };
        self.policy.verdict(subscores, reasons, self.name())
    }
}
