//! Error types for the test-call simulation core.
//!
//! Collaborators (capture, playback, backend, speech) each have their own error
//! enum. The controller catches them once and folds them into a [`SessionFault`],
//! which is what the `Error` state carries.

use crate::session::CallState;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for controller operations
pub type CallResult<T> = Result<T, CallError>;

/// Errors raised by an Audio Capture Adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("A capture is already open")]
    AlreadyCapturing,

    #[error("Capture handle {0} is not open")]
    UnknownHandle(u64),

    #[error("Audio device error: {0}")]
    Device(String),
}

/// Errors raised by an Audio Playback Adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Unsupported audio format: {0}")]
    Unsupported(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Audio output unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to fetch audio: {0}")]
    Fetch(String),

    #[error("Playback stopped before completion")]
    Stopped,
}

/// Errors raised by backend, speech and dialogue-delegate clients
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error! status: {status}, message: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure class carried by the `Error` state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultClass {
    /// Microphone access refused. Recoverable only by a fresh operator gesture.
    PermissionDenied,
    /// A backend or speech-service call failed or timed out.
    TransportFailure,
    /// Format, decode or output-device problem during playback.
    PlaybackFailure,
    /// The capture device misbehaved after access was granted.
    DeviceFailure,
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FaultClass::PermissionDenied => "permission_denied",
            FaultClass::TransportFailure => "transport_failure",
            FaultClass::PlaybackFailure => "playback_failure",
            FaultClass::DeviceFailure => "device_failure",
        };
        f.write_str(s)
    }
}

/// Human-readable failure attached to a session in the `Error` state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFault {
    pub class: FaultClass,
    pub message: String,
}

impl SessionFault {
    pub fn new(class: FaultClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    /// Hint shown under the message, mirroring what the operator can do next.
    pub fn hint(&self) -> &'static str {
        match self.class {
            FaultClass::PermissionDenied => {
                "Grant microphone access, then retry the call."
            }
            FaultClass::TransportFailure => "Check the backend connection and retry the call.",
            FaultClass::PlaybackFailure => {
                "Please ensure an audio output device is available and allowed to play."
            }
            FaultClass::DeviceFailure => "Check the microphone connection and retry the call.",
        }
    }
}

impl fmt::Display for SessionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.class)
    }
}

impl From<CaptureError> for SessionFault {
    fn from(err: CaptureError) -> Self {
        let class = match &err {
            CaptureError::PermissionDenied(_) => FaultClass::PermissionDenied,
            CaptureError::AlreadyCapturing
            | CaptureError::UnknownHandle(_)
            | CaptureError::Device(_) => FaultClass::DeviceFailure,
        };
        SessionFault::new(class, err.to_string())
    }
}

impl From<PlaybackError> for SessionFault {
    fn from(err: PlaybackError) -> Self {
        let class = match &err {
            // The greeting audio is fetched from the backend.
            PlaybackError::Fetch(_) => FaultClass::TransportFailure,
            _ => FaultClass::PlaybackFailure,
        };
        SessionFault::new(class, err.to_string())
    }
}

impl From<TransportError> for SessionFault {
    fn from(err: TransportError) -> Self {
        SessionFault::new(FaultClass::TransportFailure, err.to_string())
    }
}

/// Errors returned by Session Controller operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("`{operation}` is not valid in state {state}")]
    InvalidState {
        operation: &'static str,
        state: CallState,
    },

    #[error("Illegal transition {from} -> {to}")]
    InvalidTransition { from: CallState, to: CallState },

    #[error("The call cannot end before one AI/User exchange")]
    NoExchange,

    #[error("No active call session")]
    NoSession,

    #[error("Session view was closed")]
    Closed,

    #[error("Call failed: {0}")]
    Faulted(SessionFault),
}

impl CallError {
    /// Fault class when the error moved the session to `Error`.
    pub fn fault_class(&self) -> Option<FaultClass> {
        match self {
            CallError::Faulted(fault) => Some(fault.class),
            _ => None,
        }
    }

    /// True when the call was rejected without touching the session.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CallError::InvalidState { .. } | CallError::NoExchange | CallError::NoSession
        )
    }
}
