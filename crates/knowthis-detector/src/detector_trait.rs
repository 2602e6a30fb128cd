use knowthis_core::{Fingerprint, InternalError, Verdict};

/// Maps a clip fingerprint to a verdict.
///
/// Implementations are pure: no I/O, no randomness, no interior mutability.
/// The same fingerprint and configuration always produce the same verdict.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    fn detect(&self, fingerprint: &Fingerprint) -> Result<Verdict, InternalError>;
}
