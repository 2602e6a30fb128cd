use knowthis_core::InternalError;
use realfft::{RealFftPlanner, RealToComplex};
use std::fmt;
use std::sync::Arc;

/// Planned forward FFT over one frame length. Cheap to clone and shareable
/// across threads; every call allocates its own buffers.
#[derive(Clone)]
pub struct Spectrum {
    fft: Arc<dyn RealToComplex<f32>>,
    frame_length: usize,
    sample_rate: u32,
}

impl fmt::Debug for Spectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spectrum")
            .field("frame_length", &self.frame_length)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl Spectrum {
    pub fn new(frame_length: usize, sample_rate: u32) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_length);
        Self {
            fft,
            frame_length,
            sample_rate,
        }
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of non-negative frequency bins, `frame_length / 2 + 1`.
    pub fn bins(&self) -> usize {
        self.frame_length / 2 + 1
    }

    /// Centre frequency of bin `k` in Hz.
    pub fn bin_hz(&self, k: usize) -> f64 {
        k as f64 * self.sample_rate as f64 / self.frame_length as f64
    }

    /// Magnitude spectrum of an already windowed frame.
    pub fn magnitude(&self, windowed: &[f32]) -> Result<Vec<f64>, InternalError> {
        if windowed.len() != self.frame_length {
            return Err(InternalError::ShapeMismatch(format!(
                "frame has {} samples, FFT is planned for {}",
                windowed.len(),
                self.frame_length
            )));
        }
        let mut input = self.fft.make_input_vec();
        input.copy_from_slice(windowed);
        let mut output = self.fft.make_output_vec();
        self.fft
            .process(&mut input, &mut output)
            .map_err(|e| InternalError::Fft(e.to_string()))?;
        Ok(output.iter().map(|c| c.norm() as f64).collect())
    }
}
