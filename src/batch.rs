use knowthis_core::{AnalysisError, Fingerprint, Verdict};
use knowthis_pipeline::{Analysis, Analyzer, FormatHint};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Analyzed {
        verdict: Verdict,
        #[serde(skip_serializing_if = "Option::is_none")]
        fingerprint: Option<Fingerprint>,
        frame_count: usize,
        duration_secs: f64,
    },
    /// The input itself was unusable.
    Rejected { reason: String },
    /// Read failure or pipeline defect.
    Failed { error: String },
}

#[derive(Debug, Serialize)]
pub struct FileReport {
    pub file: PathBuf,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl FileReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }

    pub fn render_text(&self) -> String {
        let name = self.file.display();
        match &self.outcome {
            Outcome::Analyzed { verdict, .. } => {
                let mut out = format!(
                    "{name}: {} score={:.3} (cepstral={:.2} spectral={:.2} pitch={:.2})",
                    verdict.label,
                    verdict.score,
                    verdict.subscores.cepstral,
                    verdict.subscores.spectral,
                    verdict.subscores.pitch
                );
                for reason in &verdict.reasons {
                    out.push_str("\n  - ");
                    out.push_str(reason);
                }
                out
            }
            Outcome::Rejected { reason } => format!("{name}: rejected: {reason}"),
            Outcome::Failed { error } => format!("{name}: error: {error}"),
        }
    }
}

fn outcome_of(result: Result<Analysis, AnalysisError>, keep_fingerprint: bool) -> Outcome {
    match result {
        Ok(analysis) => Outcome::Analyzed {
            verdict: analysis.verdict,
            fingerprint: keep_fingerprint.then_some(analysis.fingerprint),
            frame_count: analysis.frame_count,
            duration_secs: analysis.duration_secs,
        },
        Err(e) if e.is_client_error() => Outcome::Rejected {
            reason: e.to_string(),
        },
        Err(e) => Outcome::Failed {
            error: e.to_string(),
        },
    }
}

/// Analyse every file concurrently on the blocking pool; reports keep input order.
pub async fn analyze_files(
    analyzer: Arc<Analyzer>,
    files: Vec<PathBuf>,
    keep_fingerprint: bool,
) -> Vec<FileReport> {
    let mut handles = Vec::with_capacity(files.len());
    for file in files {
        let analyzer = Arc::clone(&analyzer);
        handles.push(tokio::spawn(async move {
            let bytes = match tokio::fs::read(&file).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(file = %file.display(), "read failed: {e}");
                    return FileReport {
                        outcome: Outcome::Failed {
                            error: format!("failed to read file: {e}"),
                        },
                        file,
                    };
                }
            };
            let hint = FormatHint::from_path(&file);
            let result = tokio::task::spawn_blocking(move || {
                analyzer.analyze_detailed(&bytes, Some(&hint))
            })
            .await;
            let outcome = match result {
                Ok(result) => outcome_of(result, keep_fingerprint),
                Err(e) => Outcome::Failed {
                    error: format!("analysis task failed: {e}"),
                },
            };
            FileReport { file, outcome }
        }));
    }

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => tracing::error!("file task panicked: {e}"),
        }
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use knowthis_core::AnalysisConfig;

    fn write_tone(path: &std::path::Path, secs: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..(16000.0 * secs) as usize {
            let s = (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 16000.0).sin() * 0.4;
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("knowthis_batch_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_batch_keeps_input_order_and_classifies_outcomes() {
        let dir = scratch_dir("order");
        let good = dir.join("good.wav");
        let short = dir.join("short.wav");
        let missing = dir.join("missing.wav");
        write_tone(&good, 1.0);
        write_tone(&short, 0.1);

        let analyzer = Arc::new(Analyzer::new(AnalysisConfig::default()).unwrap());
        let reports = analyze_files(
            analyzer,
            vec![good.clone(), short.clone(), missing.clone()],
            false,
        )
        .await;

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].file, good);
        assert!(matches!(
            reports[0].outcome,
            Outcome::Analyzed {
                fingerprint: None,
                ..
            }
        ));
        assert!(matches!(reports[1].outcome, Outcome::Rejected { .. }));
        assert!(!reports[1].is_failure());
        assert!(reports[2].is_failure());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_batch_json_includes_fingerprint_on_request() {
        let dir = scratch_dir("json");
        let file = dir.join("tone.wav");
        write_tone(&file, 1.0);

        let analyzer = Arc::new(Analyzer::new(AnalysisConfig::default()).unwrap());
        let reports = analyze_files(analyzer, vec![file], true).await;
        let json = serde_json::to_value(&reports[0]).unwrap();
        assert_eq!(json["status"], "analyzed");
        assert!(json["fingerprint"]["f0.voiced_cv"].is_f64());
        assert!(json["verdict"]["label"].is_string());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_render_text_for_rejection() {
        let report = FileReport {
            file: PathBuf::from("clip.mp3"),
            outcome: Outcome::Rejected {
                reason: "audio input is empty".to_string(),
            },
        };
        assert_eq!(report.render_text(), "clip.mp3: rejected: audio input is empty");
    }
}
