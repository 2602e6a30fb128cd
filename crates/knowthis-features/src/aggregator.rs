//! Reduces per-frame feature streams to a fixed-length fingerprint.

use knowthis_core::{
    FeatureStream, Fingerprint, FingerprintKey, FingerprintLayout, InternalError, Reduction,
    CONTOUR_FEATURE,
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
struct ColumnStats {
    mean: f64,
    std: f64,
    delta: f64,
}

impl ColumnStats {
    fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                mean: 0.0,
                std: 0.0,
                delta: 0.0,
            };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let delta = if values.len() < 2 {
            0.0
        } else {
            values.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>()
                / (values.len() - 1) as f64
        };
        Self {
            mean,
            std: variance.sqrt(),
            delta,
        }
    }
}

/// Statistics of the f0 contour over voiced frames (f0 > 0) only.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ContourStats {
    mean: f64,
    std: f64,
    cv: f64,
    delta: f64,
    ratio: f64,
}

impl ContourStats {
    fn of(f0: &[f64]) -> Self {
        let voiced: Vec<f64> = f0.iter().copied().filter(|v| *v > 0.0).collect();
        let stats = ColumnStats::of(&voiced);
        let cv = if stats.mean > 0.0 {
            stats.std / stats.mean
        } else {
            0.0
        };

        // Only pairs of adjacent frames that are both voiced; a jump across
        // an unvoiced gap is not contour movement.
        let steps: Vec<f64> = f0
            .windows(2)
            .filter(|w| w[0] > 0.0 && w[1] > 0.0)
            .map(|w| (w[1] - w[0]).abs())
            .collect();
        let delta = if steps.is_empty() {
            0.0
        } else {
            steps.iter().sum::<f64>() / steps.len() as f64
        };

        let ratio = if f0.is_empty() {
            0.0
        } else {
            voiced.len() as f64 / f0.len() as f64
        };

        Self {
            mean: stats.mean,
            std: stats.std,
            cv,
            delta,
            ratio,
        }
    }

    fn get(&self, reduction: Reduction) -> Option<f64> {
        match reduction {
            Reduction::VoicedMean => Some(self.mean),
            Reduction::VoicedStd => Some(self.std),
            Reduction::VoicedCv => Some(self.cv),
            Reduction::VoicedDelta => Some(self.delta),
            Reduction::VoicedRatio => Some(self.ratio),
            Reduction::Mean | Reduction::Std | Reduction::Delta => None,
        }
    }
}

fn column(streams: &[FeatureStream], key: &FingerprintKey) -> Result<Vec<f64>, InternalError> {
    let stream = streams
        .iter()
        .find(|s| s.group == key.group)
        .ok_or_else(|| InternalError::ShapeMismatch(format!("no {} stream", key.group)))?;
    let idx = stream
        .names()
        .iter()
        .position(|n| *n == key.feature)
        .ok_or_else(|| {
            InternalError::ShapeMismatch(format!(
                "{} stream has no feature '{}'",
                key.group, key.feature
            ))
        })?;
    Ok(stream.column(idx).collect())
}

/// Reduce `streams` to one value per key of `layout`, in layout order.
///
/// Every stream must cover the same, non-zero number of frames.
pub fn aggregate(
    streams: &[FeatureStream],
    layout: &Arc<FingerprintLayout>,
) -> Result<Fingerprint, InternalError> {
    let frames = streams.first().map(|s| s.len()).unwrap_or(0);
    if frames == 0 {
        return Err(InternalError::ShapeMismatch(
            "no frames to aggregate".to_string(),
        ));
    }
    if let Some(odd) = streams.iter().find(|s| s.len() != frames) {
        return Err(InternalError::ShapeMismatch(format!(
            "{} stream has {} frames, expected {}",
            odd.group,
            odd.len(),
            frames
        )));
    }

    let mut values = Vec::with_capacity(layout.len());
    let mut cached: Option<(String, ColumnStats)> = None;
    let mut contour: Option<ContourStats> = None;

    for key in layout.keys() {
        let value = match key.reduction {
            Reduction::Mean | Reduction::Std | Reduction::Delta => {
                let stats = match &cached {
                    Some((name, stats)) if *name == key.feature => *stats,
                    _ => {
                        let stats = ColumnStats::of(&column(streams, key)?);
                        cached = Some((key.feature.clone(), stats));
                        stats
                    }
                };
                match key.reduction {
                    Reduction::Mean => stats.mean,
                    Reduction::Std => stats.std,
                    _ => stats.delta,
                }
            }
            reduction => {
                if key.feature != CONTOUR_FEATURE {
                    return Err(InternalError::ShapeMismatch(format!(
                        "contour reduction on '{}'",
                        key.feature
                    )));
                }
                let stats = match contour {
                    Some(stats) => stats,
                    None => {
                        let stats = ContourStats::of(&column(streams, key)?);
                        contour = Some(stats);
                        stats
                    }
                };
                stats.get(reduction).unwrap_or(0.0)
            }
        };
        values.push(value);
    }

    Fingerprint::new(Arc::clone(layout), values)
}
