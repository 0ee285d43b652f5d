//! Error types for the audio device adapters

use callsim_core::CaptureError;
use thiserror::Error;

/// Result type alias for device operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors raised while talking to audio hardware
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio stream error: {0}")]
    AudioStream(String),

    #[error("Capture thread error: {0}")]
    CaptureThread(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<cpal::DevicesError> for VoiceError {
    fn from(err: cpal::DevicesError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}

impl From<VoiceError> for CaptureError {
    fn from(err: VoiceError) -> Self {
        match err {
            // An input that cannot be opened is as unusable as a refused grant.
            VoiceError::AudioDevice(msg) | VoiceError::AudioStream(msg) => {
                CaptureError::PermissionDenied(msg)
            }
            other => CaptureError::Device(other.to_string()),
        }
    }
}
