use std::fmt;

use tonebox_audio::BackendError;

/// Failures surfaced by the performance controller.
///
/// None of these are fatal; the host turns them into status text.
#[derive(Debug, Clone, PartialEq)]
pub enum PerformanceError {
    /// The audio engine refused to start. Sticky until the user retries.
    ActivationFailure(String),
    /// MIDI access was refused or no MIDI subsystem exists.
    MidiUnavailable(String),
    /// The user (or the platform) denied microphone access.
    MicrophoneAccessDenied(String),
    /// The bound MIDI input disappeared.
    DeviceVanished(String),
    /// Instrument recording was requested but the engine has no capture tap.
    CaptureUnavailable,
    /// A finished capture could not be written, or a take file could not be released.
    TakeStorage(String),
    Backend(BackendError),
    Config(String),
}

impl fmt::Display for PerformanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerformanceError::ActivationFailure(e) => write!(f, "audio engine failed to start: {}", e),
            PerformanceError::MidiUnavailable(e) => write!(f, "MIDI unavailable: {}", e),
            PerformanceError::MicrophoneAccessDenied(e) => write!(f, "microphone access denied: {}", e),
            PerformanceError::DeviceVanished(name) => write!(f, "MIDI input '{}' disconnected", name),
            PerformanceError::CaptureUnavailable => write!(f, "instrument capture is not available"),
            PerformanceError::TakeStorage(e) => write!(f, "take storage: {}", e),
            PerformanceError::Backend(e) => write!(f, "audio backend: {}", e),
            PerformanceError::Config(e) => write!(f, "config: {}", e),
        }
    }
}

impl std::error::Error for PerformanceError {}

impl From<BackendError> for PerformanceError {
    fn from(e: BackendError) -> Self {
        PerformanceError::Backend(e)
    }
}

pub type PerformanceResult<T = ()> = Result<T, PerformanceError>;
