use knowthis_core::{AnalysisError, AudioBuffer, DecodeError, DecoderConfig, InternalError};
use rubato::{FftFixedIn, Resampler};
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

const MIN_SHORTFALL_FRAMES: u64 = 2048;
const RESAMPLE_CHUNK: usize = 1024;

/// Optional container hint supplied by the caller (file extension and/or MIME type).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatHint {
    pub extension: Option<String>,
    pub mime_type: Option<String>,
}

impl FormatHint {
    pub fn from_extension(ext: &str) -> Self {
        Self {
            extension: Some(ext.trim_start_matches('.').to_ascii_lowercase()),
            mime_type: None,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self {
            extension: path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase()),
            mime_type: None,
        }
    }

    pub fn from_mime(mime: &str) -> Self {
        Self {
            extension: None,
            mime_type: Some(mime.to_ascii_lowercase()),
        }
    }

    fn to_symphonia(&self) -> Hint {
        let mut hint = Hint::new();
        if let Some(ext) = &self.extension {
            hint.with_extension(ext);
        }
        if let Some(mime) = &self.mime_type {
            hint.mime_type(mime);
        }
        hint
    }
}

/// Decode an uploaded clip into mono PCM at `config.sample_rate`.
pub fn decode(
    bytes: &[u8],
    hint: Option<&FormatHint>,
    config: &DecoderConfig,
) -> Result<AudioBuffer, AnalysisError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty.into());
    }
    if bytes.len() > config.max_input_bytes {
        return Err(DecodeError::TooLarge {
            size: bytes.len(),
            limit: config.max_input_bytes,
        }
        .into());
    }
    if let Some(ext) = hint.and_then(|h| h.extension.as_deref()) {
        if !config
            .accepted_extensions
            .iter()
            .any(|a| a.eq_ignore_ascii_case(ext))
        {
            return Err(DecodeError::UnsupportedFormat(format!(".{ext}")).into());
        }
    }

    let (mono, source_rate) = decode_to_mono(bytes, hint, config)?;

    let duration_ms = mono.len() as u64 * 1000 / source_rate as u64;
    if duration_ms < config.min_duration_ms {
        return Err(DecodeError::TooShort {
            duration_ms,
            min_ms: config.min_duration_ms,
        }
        .into());
    }

    let samples = if source_rate == config.sample_rate {
        mono
    } else {
        resample(&mono, source_rate, config.sample_rate)?
    };

    debug!(
        source_rate,
        target_rate = config.sample_rate,
        samples = samples.len(),
        duration_ms,
        "decoded clip"
    );

    Ok(AudioBuffer::new(config.sample_rate, samples)?)
}

/// Demux and decode the first audio track, averaging channels into one.
/// Returns the mono samples and their native sample rate.
fn decode_to_mono(
    bytes: &[u8],
    hint: Option<&FormatHint>,
    config: &DecoderConfig,
) -> Result<(Vec<f32>, u32), DecodeError> {
    let source = Box::new(Cursor::new(bytes.to_vec())) as Box<dyn MediaSource>;
    let mss = MediaSourceStream::new(source, Default::default());
    let hint = hint.map(FormatHint::to_symphonia).unwrap_or_else(Hint::new);

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::UnrecognizedFormat(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut source_rate = codec_params.sample_rate;
    if let (Some(frames), Some(rate)) = (codec_params.n_frames, source_rate) {
        let duration_secs = frames as f64 / rate as f64;
        if duration_secs > config.max_duration_secs {
            return Err(DecodeError::TooLong {
                duration_secs,
                max_secs: config.max_duration_secs,
            });
        }
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| match e {
            SymphoniaError::Unsupported(what) => DecodeError::UnsupportedCodec(what.to_string()),
            other => DecodeError::Corrupt(other.to_string()),
        })?;

    let mut mono: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                debug!("track list changed mid-stream, stopping at first track");
                break;
            }
            Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                warn!("undecodable packet at ts {}: {}", packet.ts(), msg);
                return Err(DecodeError::Corrupt(format!(
                    "undecodable packet at ts {}: {msg}",
                    packet.ts()
                )));
            }
            Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
        };

        let spec = *decoded.spec();
        if decoded.frames() == 0 {
            continue;
        }
        let rate = *source_rate.get_or_insert(spec.rate);
        let channels = spec.channels.count().max(1);

        let mut interleaved = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        interleaved.copy_interleaved_ref(decoded);
        mono.extend(
            interleaved
                .samples()
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );

        let duration_secs = mono.len() as f64 / rate as f64;
        if duration_secs > config.max_duration_secs {
            return Err(DecodeError::TooLong {
                duration_secs,
                max_secs: config.max_duration_secs,
            });
        }
    }

    let source_rate = match source_rate {
        Some(rate) if rate > 0 => rate,
        _ => return Err(DecodeError::Corrupt("stream has no sample rate".to_string())),
    };
    if let Some(declared) = codec_params.n_frames {
        check_complete(declared, mono.len())?;
    }

    Ok((mono, source_rate))
}

/// A stream that ends well before the frame count its container declares was cut
/// off. Lossy codecs may differ from the declared count by padding, so a shortfall
/// up to one percent (or [`MIN_SHORTFALL_FRAMES`]) passes.
fn check_complete(declared: u64, decoded: usize) -> Result<(), DecodeError> {
    let tolerance = (declared / 100).max(MIN_SHORTFALL_FRAMES);
    if (decoded as u64).saturating_add(tolerance) < declared {
        return Err(DecodeError::Corrupt(format!(
            "truncated stream: decoded {decoded} of {declared} declared frames"
        )));
    }
    Ok(())
}

/// Convert mono samples between rates with an FFT resampler, compensating its delay.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>, InternalError> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 1)
        .map_err(|e| InternalError::Resample(e.to_string()))?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as f64 * to as f64 / from as f64).round() as usize;
    let mut out = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    let mut pos = 0;
    loop {
        let needed = resampler.input_frames_next();
        if samples.len() - pos < needed {
            break;
        }
        let block = [&samples[pos..pos + needed]];
        let chunk = resampler
            .process(&block[..], None)
            .map_err(|e| InternalError::Resample(e.to_string()))?;
        out.extend_from_slice(&chunk[0]);
        pos += needed;
    }
    if pos < samples.len() {
        let tail = [&samples[pos..]];
        let chunk = resampler
            .process_partial(Some(&tail[..]), None)
            .map_err(|e| InternalError::Resample(e.to_string()))?;
        out.extend_from_slice(&chunk[0]);
    }
    while out.len() < expected + delay {
        let chunk = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| InternalError::Resample(e.to_string()))?;
        if chunk[0].is_empty() {
            break;
        }
        out.extend_from_slice(&chunk[0]);
    }

    out.drain(..delay.min(out.len()));
    out.truncate(expected);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_from_path_lowercases_extension() {
        let hint = FormatHint::from_path(Path::new("/tmp/Voice.M4A"));
        assert_eq!(hint.extension.as_deref(), Some("m4a"));
        assert!(hint.mime_type.is_none());
    }

    #[test]
    fn test_hint_from_extension_strips_dot() {
        assert_eq!(
            FormatHint::from_extension(".WAV").extension.as_deref(),
            Some("wav")
        );
    }

    #[test]
    fn test_decode_empty_fails() {
        let err = decode(&[], None, &DecoderConfig::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::Decode(DecodeError::Empty)));
    }

    #[test]
    fn test_decode_over_size_limit_fails_fast() {
        let config = DecoderConfig {
            max_input_bytes: 8,
            ..DecoderConfig::default()
        };
        let err = decode(&[0u8; 16], None, &config).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Decode(DecodeError::TooLarge { size: 16, limit: 8 })
        ));
    }

    #[test]
    fn test_decode_rejects_unaccepted_extension() {
        let hint = FormatHint::from_extension("exe");
        let err = decode(&[1, 2, 3, 4], Some(&hint), &DecoderConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Decode(DecodeError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_decode_garbage_is_unrecognized() {
        let garbage: Vec<u8> = (0..4096u32).map(|i| (i * 7919 % 251) as u8).collect();
        let err = decode(&garbage, None, &DecoderConfig::default()).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_check_complete_rejects_large_shortfall() {
        assert!(check_complete(32000, 32000).is_ok());
        assert!(check_complete(32000, 15989).is_err());
    }

    #[test]
    fn test_check_complete_tolerates_codec_padding() {
        // 1% of one minute at 44.1 kHz, or 2048 frames for short clips.
        assert!(check_complete(2_646_000, 2_646_000 - 26_000).is_ok());
        assert!(check_complete(2_646_000, 2_646_000 - 27_000).is_err());
        assert!(check_complete(46_080, 46_080 - 2048).is_ok());
        assert!(check_complete(46_080, 46_080 - 2049).is_err());
        assert!(check_complete(46_080, 50_000).is_ok());
    }

    #[test]
    fn test_resample_identity_when_rates_match() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16000, 16000).unwrap(), samples);
    }

    #[test]
    fn test_resample_length_follows_ratio() {
        let samples: Vec<f32> = (0..44100)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin() * 0.5)
            .collect();
        let out = resample(&samples, 44100, 16000).unwrap();
        assert_eq!(out.len(), 16000);
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_resample_preserves_tone_level() {
        let samples: Vec<f32> = (0..48000)
            .map(|i| (2.0 * std::f32::consts::PI * 300.0 * i as f32 / 48000.0).sin() * 0.5)
            .collect();
        let out = resample(&samples, 48000, 16000).unwrap();
        let mid = &out[2000..14000];
        let peak = mid.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.05, "peak {peak}");
    }
}
