use crate::cepstral::CepstralExtractor;
use crate::pitch::PitchExtractor;
use crate::spectral::SpectralExtractor;
use crate::spectrum::Spectrum;
use knowthis_core::{AnalysisConfig, FeatureGroup, FeatureStream, Frame, InternalError};
use rayon::prelude::*;
use tracing::debug;

/// Runs the three extractors over one clip's frames.
///
/// With `parallel` set, frames are processed across the rayon pool and the
/// three extractors run as joined tasks. Each value depends only on its own
/// frame and rows are collected in frame order, so both modes produce
/// identical streams.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    spectrum: Spectrum,
    cepstral: CepstralExtractor,
    spectral: SpectralExtractor,
    pitch: PitchExtractor,
    parallel: bool,
}

impl FeatureExtractor {
    pub fn new(config: &AnalysisConfig) -> Self {
        let spectrum = Spectrum::new(config.framing.frame_length, config.decoder.sample_rate);
        Self {
            cepstral: CepstralExtractor::new(config, spectrum.clone()),
            spectral: SpectralExtractor::new(config, spectrum.clone()),
            pitch: PitchExtractor::new(config),
            spectrum,
            parallel: config.pipeline.parallel,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn cepstral(&self) -> &CepstralExtractor {
        &self.cepstral
    }

    pub fn spectral(&self) -> &SpectralExtractor {
        &self.spectral
    }

    pub fn pitch(&self) -> &PitchExtractor {
        &self.pitch
    }

    /// One stream per group, in `FeatureGroup::ALL` order.
    pub fn extract_all(&self, frames: &[Frame]) -> Result<Vec<FeatureStream>, InternalError> {
        let magnitudes: Vec<Vec<f64>> = if self.parallel {
            frames
                .par_iter()
                .map(|f| self.spectrum.magnitude(&f.windowed))
                .collect::<Result<_, _>>()?
        } else {
            frames
                .iter()
                .map(|f| self.spectrum.magnitude(&f.windowed))
                .collect::<Result<_, _>>()?
        };

        let (cepstral, (spectral, pitch)) = if self.parallel {
            rayon::join(
                || self.cepstral_stream(&magnitudes),
                || {
                    rayon::join(
                        || self.spectral_stream(frames, &magnitudes),
                        || self.pitch_stream(frames),
                    )
                },
            )
        } else {
            (
                self.cepstral_stream(&magnitudes),
                (
                    self.spectral_stream(frames, &magnitudes),
                    self.pitch_stream(frames),
                ),
            )
        };

        let streams = vec![cepstral?, spectral?, pitch?];
        debug!(
            frames = frames.len(),
            parallel = self.parallel,
            "extracted feature streams"
        );
        Ok(streams)
    }

    /// Apply `f` to every index in order, across the pool when parallel.
    fn rows<F>(&self, count: usize, f: F) -> Vec<Vec<f64>>
    where
        F: Fn(usize) -> Vec<f64> + Sync + Send,
    {
        if self.parallel {
            (0..count).into_par_iter().map(f).collect()
        } else {
            (0..count).map(f).collect()
        }
    }

    fn stream(
        group: FeatureGroup,
        names: &[String],
        rows: Vec<Vec<f64>>,
    ) -> Result<FeatureStream, InternalError> {
        let mut stream = FeatureStream::new(group, names.to_vec());
        for row in rows {
            stream.push(row)?;
        }
        Ok(stream)
    }

    fn cepstral_stream(&self, magnitudes: &[Vec<f64>]) -> Result<FeatureStream, InternalError> {
        let rows = self.rows(magnitudes.len(), |i| {
            self.cepstral.mfcc_from_magnitude(&magnitudes[i])
        });
        Self::stream(FeatureGroup::Cepstral, self.cepstral.feature_names(), rows)
    }

    fn spectral_stream(
        &self,
        frames: &[Frame],
        magnitudes: &[Vec<f64>],
    ) -> Result<FeatureStream, InternalError> {
        let rows = self.rows(frames.len(), |i| {
            self.spectral
                .features_from_magnitude(&frames[i], &magnitudes[i])
                .to_row()
        });
        Self::stream(FeatureGroup::Spectral, self.spectral.feature_names(), rows)
    }

    fn pitch_stream(&self, frames: &[Frame]) -> Result<FeatureStream, InternalError> {
        let rate = self.pitch.sample_rate();
        let rows = self.rows(frames.len(), |i| {
            self.pitch.extract_pitch(&frames[i], rate).to_row()
        });
        Self::stream(FeatureGroup::Pitch, self.pitch.feature_names(), rows)
    }
}
