use knowthis_audio::{decode, FormatHint, Framer};
use knowthis_core::{
    AnalysisConfig, AnalysisError, AudioBuffer, ConfigError, Fingerprint, FingerprintLayout,
    Frame, InternalError, Verdict,
};
use knowthis_detector::{Detector, DetectorRegistry};
use knowthis_features::{aggregate, FeatureExtractor};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Full result of one analysis call.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub verdict: Verdict,
    pub fingerprint: Fingerprint,
    pub frame_count: usize,
    pub duration_secs: f64,
}

/// Decode, frame, extract, aggregate and detect with one fixed configuration.
///
/// Holds no per-call state; share it behind an `Arc` between concurrent callers.
pub struct Analyzer {
    config: Arc<AnalysisConfig>,
    extractor: FeatureExtractor,
    layout: Arc<FingerprintLayout>,
    detector: Box<dyn Detector>,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self, ConfigError> {
        Self::with_registry(config, &DetectorRegistry::new())
    }

    pub fn with_registry(
        config: AnalysisConfig,
        registry: &DetectorRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let layout = Arc::new(FingerprintLayout::for_config(&config));
        let detector = registry.create_configured(&config, Arc::clone(&layout))?;
        let extractor = FeatureExtractor::new(&config);
        debug!(
            detector = detector.name(),
            fingerprint_len = layout.len(),
            "analyzer ready"
        );
        Ok(Self {
            config: Arc::new(config),
            extractor,
            layout,
            detector,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn layout(&self) -> &Arc<FingerprintLayout> {
        &self.layout
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    pub fn analyze(&self, bytes: &[u8], hint: Option<&FormatHint>) -> Result<Verdict, AnalysisError> {
        Ok(self.analyze_detailed(bytes, hint)?.verdict)
    }

    pub fn analyze_detailed(
        &self,
        bytes: &[u8],
        hint: Option<&FormatHint>,
    ) -> Result<Analysis, AnalysisError> {
        let started = Instant::now();
        let buffer = decode(bytes, hint, &self.config.decoder).map_err(log_failure)?;
        debug!(
            bytes = bytes.len(),
            samples = buffer.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "decode finished"
        );
        self.analyze_buffer(&buffer)
    }

    /// Analyse PCM the caller already holds. The buffer must be at the
    /// configured analysis rate.
    pub fn analyze_buffer(&self, buffer: &AudioBuffer) -> Result<Analysis, AnalysisError> {
        self.run(buffer).map_err(|e| log_failure(AnalysisError::Internal(e)))
    }

    fn run(&self, buffer: &AudioBuffer) -> Result<Analysis, InternalError> {
        if buffer.sample_rate() != self.config.decoder.sample_rate {
            return Err(InternalError::ShapeMismatch(format!(
                "buffer is {} Hz, analysis rate is {} Hz",
                buffer.sample_rate(),
                self.config.decoder.sample_rate
            )));
        }

        let started = Instant::now();
        let frames: Vec<Frame> = Framer::from_config(buffer, &self.config.framing)?
            .iter()
            .collect();
        let streams = self.extractor.extract_all(&frames)?;
        let fingerprint = aggregate(&streams, &self.layout)?;
        let verdict = self.detector.detect(&fingerprint)?;

        debug!(
            frames = frames.len(),
            score = verdict.score,
            label = %verdict.label,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis finished"
        );

        Ok(Analysis {
            verdict,
            fingerprint,
            frame_count: frames.len(),
            duration_secs: buffer.duration_secs(),
        })
    }
}

/// One-shot analysis with a freshly built analyzer.
pub fn analyze(bytes: &[u8], config: &AnalysisConfig) -> Result<Verdict, AnalysisError> {
    Analyzer::new(config.clone())?.analyze(bytes, None)
}

/// Rejected input is the caller's problem and stays at debug; anything else
/// is a fault on our side.
fn log_failure(err: AnalysisError) -> AnalysisError {
    if err.is_client_error() {
        debug!("input rejected: {err}");
    } else {
        error!("analysis failed: {err}");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn captured(f: impl FnOnce()) -> String {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = log.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_internal_decode_failure_is_logged_as_error() {
        let out = captured(|| {
            let err = log_failure(AnalysisError::Internal(InternalError::Resample(
                "bad ratio".to_string(),
            )));
            assert!(!err.is_client_error());
        });
        assert!(out.contains("ERROR"), "{out}");
        assert!(out.contains("bad ratio"), "{out}");
    }

    #[test]
    fn test_rejected_input_is_not_logged_as_error() {
        let analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
        let out = captured(|| {
            assert!(analyzer.analyze(&[], None).is_err());
        });
        assert!(!out.contains("ERROR"), "{out}");
        assert!(out.contains("input rejected"), "{out}");
    }

    #[test]
    fn test_wrong_rate_buffer_is_logged_as_error() {
        let analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
        let buffer = AudioBuffer::new(8000, vec![0.1; 8000]).unwrap();
        let out = captured(|| {
            assert!(analyzer.analyze_buffer(&buffer).is_err());
        });
        assert!(out.contains("ERROR"), "{out}");
        assert!(out.contains("8000 Hz"), "{out}");
    }

    #[test]
    fn test_analyzer_rejects_unknown_engine() {
        let mut config = AnalysisConfig::default();
        config.detector.engine = "neural".to_string();
        assert!(matches!(
            Analyzer::new(config),
            Err(ConfigError::UnknownDetector(_))
        ));
    }

    #[test]
    fn test_analyzer_rejects_invalid_config() {
        let mut config = AnalysisConfig::default();
        config.framing.hop_length = 0;
        assert!(matches!(Analyzer::new(config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_analyze_buffer_rejects_wrong_rate() {
        let analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
        let buffer = AudioBuffer::new(8000, vec![0.1; 8000]).unwrap();
        let err = analyzer.analyze_buffer(&buffer).unwrap_err();
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_analyze_buffer_of_silence() {
        let analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
        let buffer = AudioBuffer::new(16000, vec![0.0; 16000]).unwrap();
        let analysis = analyzer.analyze_buffer(&buffer).unwrap();
        assert_eq!(analysis.frame_count, 59);
        assert_ne!(analysis.verdict.label, knowthis_core::Label::Ai);
        assert_eq!(analysis.fingerprint.len(), analyzer.layout().len());
    }

    #[test]
    fn test_analyzer_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Analyzer>();
    }
}
