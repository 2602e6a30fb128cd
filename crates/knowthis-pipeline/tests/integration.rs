use knowthis_core::{AnalysisConfig, AnalysisError, DecodeError, Label};
use knowthis_pipeline::{analyze, Analyzer, FormatHint};
use std::io::Cursor;

fn wav_bytes(sample_rate: u32, samples: &[f32]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut buf = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec).unwrap();
        for &s in samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    buf
}

fn tone(freq: f64, secs: f64) -> Vec<f32> {
    let n = (16000.0 * secs) as usize;
    (0..n)
        .map(|i| ((2.0 * std::f64::consts::PI * freq * i as f64 / 16000.0).sin() * 0.5) as f32)
        .collect()
}

/// Vibrato tone with an amplitude envelope and a little noise, loosely speech-like.
fn wobbly(secs: f64) -> Vec<f32> {
    let n = (16000.0 * secs) as usize;
    let mut state = 42u32;
    let mut phase = 0.0f64;
    (0..n)
        .map(|i| {
            let t = i as f64 / 16000.0;
            let f0 = 160.0 + 40.0 * (2.0 * std::f64::consts::PI * 3.0 * t).sin();
            phase += 2.0 * std::f64::consts::PI * f0 / 16000.0;
            let envelope = 0.2 + 0.2 * (2.0 * std::f64::consts::PI * 1.5 * t).sin().abs();
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            let noise = ((state >> 8) as f64 / (1u32 << 24) as f64 - 0.5) * 0.05;
            (envelope * (phase.sin() + 0.4 * (2.0 * phase).sin()) + noise) as f32
        })
        .collect()
}

#[test]
fn test_analyze_is_bit_identical_across_runs() {
    let bytes = wav_bytes(16000, &wobbly(2.0));
    let analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
    let a = analyzer.analyze_detailed(&bytes, None).unwrap();
    let b = analyzer.analyze_detailed(&bytes, None).unwrap();

    let bits = |values: &[f64]| values.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(a.fingerprint.values()), bits(b.fingerprint.values()));
    assert_eq!(a.verdict, b.verdict);
    assert_eq!(a.verdict.score.to_bits(), b.verdict.score.to_bits());
}

#[test]
fn test_parallel_and_sequential_runs_agree() {
    let bytes = wav_bytes(16000, &wobbly(1.5));
    let parallel = Analyzer::new(AnalysisConfig::default()).unwrap();
    let mut config = AnalysisConfig::default();
    config.pipeline.parallel = false;
    let sequential = Analyzer::new(config).unwrap();

    let a = parallel.analyze_detailed(&bytes, None).unwrap();
    let b = sequential.analyze_detailed(&bytes, None).unwrap();
    assert_eq!(a.fingerprint.values(), b.fingerprint.values());
    assert_eq!(a.verdict, b.verdict);
}

#[test]
fn test_fingerprint_length_is_duration_invariant() {
    let analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
    let lengths: Vec<usize> = [1.0, 5.0, 30.0]
        .iter()
        .map(|&secs| {
            let bytes = wav_bytes(16000, &wobbly(secs));
            analyzer.analyze_detailed(&bytes, None).unwrap().fingerprint.len()
        })
        .collect();
    assert_eq!(lengths, vec![68, 68, 68]);
}

#[test]
fn test_silence_is_never_ai() {
    let bytes = wav_bytes(16000, &vec![0.0; 16000]);
    let analysis = Analyzer::new(AnalysisConfig::default())
        .unwrap()
        .analyze_detailed(&bytes, None)
        .unwrap();
    let fp = &analysis.fingerprint;
    assert_eq!(fp.get("zero_crossing_rate.mean"), Some(0.0));
    assert_eq!(fp.get("zero_crossing_rate.std"), Some(0.0));
    // Mean of a non-negative quantity is zero only if every frame is zero.
    assert_eq!(fp.get("voicing_confidence.mean"), Some(0.0));
    assert_ne!(analysis.verdict.label, Label::Ai);
}

#[test]
fn test_empty_input_is_decode_error() {
    let err = analyze(&[], &AnalysisConfig::default()).unwrap_err();
    assert!(matches!(err, AnalysisError::Decode(DecodeError::Empty)));
    assert!(err.is_client_error());
}

#[test]
fn test_too_short_input_is_decode_error() {
    let bytes = wav_bytes(16000, &tone(200.0, 0.1));
    let err = analyze(&bytes, &AnalysisConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::Decode(DecodeError::TooShort { .. })
    ));
}

#[test]
fn test_scores_are_bounded_and_label_follows_thresholds() {
    let config = AnalysisConfig::default();
    let analyzer = Analyzer::new(config.clone()).unwrap();
    for samples in [tone(200.0, 1.0), wobbly(1.0), wobbly(3.0), vec![0.0; 8000]] {
        let verdict = analyzer.analyze(&wav_bytes(16000, &samples), None).unwrap();
        for (_, sub) in verdict.subscores.iter() {
            assert!((0.0..=1.0).contains(&sub));
        }
        assert!((0.0..=1.0).contains(&verdict.score));
        let expected = if verdict.score >= config.detector.high_threshold {
            Label::Ai
        } else if verdict.score <= config.detector.low_threshold {
            Label::Human
        } else {
            Label::Uncertain
        };
        assert_eq!(verdict.label, expected);
    }
}

#[test]
fn test_pure_tone_drives_pitch_score_to_ai_extreme() {
    let bytes = wav_bytes(16000, &tone(200.0, 2.0));
    let analysis = Analyzer::new(AnalysisConfig::default())
        .unwrap()
        .analyze_detailed(&bytes, Some(&FormatHint::from_extension("wav")))
        .unwrap();

    let fp = &analysis.fingerprint;
    assert!(fp.get("f0.voiced_cv").unwrap() < 0.01);
    assert!((fp.get("f0.voiced_mean").unwrap() - 200.0).abs() < 2.0);
    assert!(fp.get("spectral_flatness.mean").unwrap() < 0.1);
    assert!(analysis.verdict.subscores.pitch >= 0.9);
    assert!((analysis.duration_secs - 2.0).abs() < 1e-9);
    assert_eq!(analysis.frame_count, 122);
}

#[test]
fn test_reweighting_moves_score_monotonically() {
    let bytes = wav_bytes(16000, &tone(200.0, 2.0));
    let mut scores = Vec::new();
    for pitch in [0.2, 0.4, 0.6] {
        let rest = (1.0 - pitch) / 2.0;
        let mut config = AnalysisConfig::default();
        config.detector.weights.cepstral = rest;
        config.detector.weights.spectral = rest;
        config.detector.weights.pitch = pitch;
        let verdict = Analyzer::new(config).unwrap().analyze(&bytes, None).unwrap();
        scores.push((verdict.subscores, verdict.score));
    }
    // Sub-scores do not depend on weights; the score is their declared weighted sum.
    assert!(scores.windows(2).all(|w| w[0].0 == w[1].0));
    let pitch_sub = scores[0].0.pitch;
    let others = (scores[0].0.cepstral + scores[0].0.spectral) / 2.0;
    for (i, pitch) in [0.2, 0.4, 0.6].iter().enumerate() {
        let expected = pitch * pitch_sub + (1.0 - pitch) * others;
        assert!((scores[i].1 - expected).abs() < 1e-9);
    }
    if pitch_sub > others {
        assert!(scores[0].1 < scores[1].1 && scores[1].1 < scores[2].1);
    }
}

#[test]
fn test_linear_engine_end_to_end() {
    let config = AnalysisConfig::from_toml_str(
        r#"
[detector]
engine = "linear"

[detector.linear.pitch]
bias = 3.0
weights = { "f0.voiced_cv" = -60.0 }
"#,
    )
    .unwrap();
    let analyzer = Analyzer::new(config).unwrap();
    assert_eq!(analyzer.detector_name(), "linear");
    let verdict = analyzer.analyze(&wav_bytes(16000, &tone(200.0, 1.0)), None).unwrap();
    assert_eq!(verdict.detector, "linear");
    assert!(verdict.subscores.pitch > 0.9);
    assert_eq!(verdict.subscores.cepstral, 0.5);
}

#[test]
fn test_verdict_serializes_for_transport() {
    let verdict = analyze(&wav_bytes(16000, &wobbly(1.0)), &AnalysisConfig::default()).unwrap();
    let json = serde_json::to_value(&verdict).unwrap();
    assert!(json["score"].is_f64());
    assert!(["human", "ai", "uncertain"].contains(&json["label"].as_str().unwrap()));
    assert!(json["subscores"]["pitch"].is_f64());
    assert_eq!(json["detector"], "rule");
}

#[test]
fn test_fingerprint_serializes_as_ordered_map() {
    let analysis = Analyzer::new(AnalysisConfig::default())
        .unwrap()
        .analyze_detailed(&wav_bytes(16000, &wobbly(1.0)), None)
        .unwrap();
    let json = serde_json::to_string(&analysis.fingerprint).unwrap();
    let first = json.find("\"mfcc_0.mean\"").unwrap();
    let last = json.find("\"f0.voiced_ratio\"").unwrap();
    assert!(first < last);
}
