use knowthis_core::{AudioBuffer, Frame, FramingConfig, InternalError, WindowKind};
use std::f64::consts::PI;

/// Taper coefficients of length `n` (symmetric form).
pub fn window(kind: WindowKind, n: usize) -> Vec<f32> {
    if n <= 1 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| {
            let phase = 2.0 * PI * i as f64 / denom;
            let w = match kind {
                WindowKind::Hann => 0.5 - 0.5 * phase.cos(),
                WindowKind::Hamming => 0.54 - 0.46 * phase.cos(),
                WindowKind::Rectangular => 1.0,
            };
            w as f32
        })
        .collect()
}

/// Number of frames for a clip of `len` samples. Always at least one.
pub fn frame_count(len: usize, frame_length: usize, hop_length: usize) -> usize {
    if len <= frame_length {
        1
    } else {
        (len - frame_length) / hop_length + 1
    }
}

/// Restartable framing of one clip. Each call to [`Framer::iter`] starts over.
#[derive(Debug, Clone)]
pub struct Framer<'a> {
    buffer: &'a AudioBuffer,
    frame_length: usize,
    hop_length: usize,
    window: Vec<f32>,
}

impl<'a> Framer<'a> {
    pub fn new(
        buffer: &'a AudioBuffer,
        frame_length: usize,
        hop_length: usize,
        kind: WindowKind,
    ) -> Result<Self, InternalError> {
        if frame_length == 0 || hop_length == 0 || hop_length > frame_length {
            return Err(InternalError::ShapeMismatch(format!(
                "invalid framing: frame_length={frame_length}, hop_length={hop_length}"
            )));
        }
        Ok(Self {
            buffer,
            frame_length,
            hop_length,
            window: window(kind, frame_length),
        })
    }

    pub fn from_config(buffer: &'a AudioBuffer, config: &FramingConfig) -> Result<Self, InternalError> {
        Self::new(buffer, config.frame_length, config.hop_length, config.window)
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    pub fn frame_count(&self) -> usize {
        frame_count(self.buffer.len(), self.frame_length, self.hop_length)
    }

    pub fn iter(&self) -> Frames<'_> {
        Frames {
            framer: self,
            next: 0,
            count: self.frame_count(),
        }
    }

    fn build(&self, index: usize) -> Frame {
        let samples = self.buffer.samples();
        let start = index * self.hop_length;
        let end = (start + self.frame_length).min(samples.len());

        let mut raw = vec![0.0f32; self.frame_length];
        raw[..end - start].copy_from_slice(&samples[start..end]);
        let windowed = raw
            .iter()
            .zip(self.window.iter())
            .map(|(s, w)| s * w)
            .collect();

        Frame {
            index,
            start,
            raw,
            windowed,
        }
    }
}

impl<'a, 'b> IntoIterator for &'b Framer<'a> {
    type Item = Frame;
    type IntoIter = Frames<'b>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct Frames<'a> {
    framer: &'a Framer<'a>,
    next: usize,
    count: usize,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.next >= self.count {
            return None;
        }
        let frame = self.framer.build(self.next);
        self.next += 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Frames<'_> {}

/// Frame a clip with an explicit geometry.
pub fn frame(
    buffer: &AudioBuffer,
    frame_length: usize,
    hop_length: usize,
    kind: WindowKind,
) -> Result<Framer<'_>, InternalError> {
    Framer::new(buffer, frame_length, hop_length, kind)
}
