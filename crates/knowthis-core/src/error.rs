use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("detector not found: {0}")]
    UnknownDetector(String),

    #[error("unknown fingerprint key: {0}")]
    UnknownFingerprintKey(String),
}

/// Input the caller can fix: bad bytes, wrong format, wrong length.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("audio input is empty")]
    Empty,

    #[error("audio input is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("unrecognized audio format: {0}")]
    UnrecognizedFormat(String),

    #[error("no audio stream found in input")]
    NoAudioTrack,

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("corrupt audio stream: {0}")]
    Corrupt(String),

    #[error("audio is too short: {duration_ms} ms, minimum is {min_ms} ms")]
    TooShort { duration_ms: u64, min_ms: u64 },

    #[error("audio is too long: {duration_secs:.2} s, maximum is {max_secs:.2} s")]
    TooLong { duration_secs: f64, max_secs: f64 },
}

/// A defect inside the pipeline. Never caused by caller input alone.
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("non-finite value in {stage} feature '{feature}'")]
    NonFinite { stage: String, feature: String },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("FFT failed: {0}")]
    Fft(String),

    #[error("resampling failed: {0}")]
    Resample(String),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Internal(#[from] InternalError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AnalysisError {
    /// True when the failure should be reported back to the client as its own fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AnalysisError::Decode(_))
    }
}
