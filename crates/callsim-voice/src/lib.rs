//! # CallSim Voice - Audio Devices for the Test Call
//!
//! Real-hardware implementations of the capture and playback seams of
//! `callsim-core`. Built on cpal (input) and rodio (output).
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  Session Controller                    │
//! │        AudioCapture                AudioPlayback       │
//! │             ↓                             ↓            │
//! │  ┌────────────────────┐       ┌────────────────────┐   │
//! │  │ MicrophoneCapture  │       │  SpeakerPlayback   │   │
//! │  │ (cpal, own thread) │       │ (rodio, blocking)  │   │
//! │  └────────────────────┘       └────────────────────┘   │
//! │        ↓ WAV clip                  ↑ mp3/wav bytes     │
//! │     /transcribe                /synthesize, /audio     │
//! └────────────────────────────────────────────────────────┘
//! ```

pub mod capture;
pub mod error;
pub mod playback;
pub mod wav;

pub use capture::MicrophoneCapture;
pub use error::{VoiceError, VoiceResult};
pub use playback::{check_playable, SpeakerPlayback};
pub use wav::encode_wav;

use callsim_core::{AudioDevices, AudioSettings, BackendConfig, HttpBackend, TransportError};

/// Default microphone and speaker, ready to hand to a `SessionController`.
pub fn default_devices(
    audio: &AudioSettings,
    backend: &BackendConfig,
) -> Result<AudioDevices, TransportError> {
    let http = HttpBackend::new(backend)?;
    Ok(AudioDevices {
        capture: Box::new(MicrophoneCapture::new(audio.clone())),
        playback: Box::new(SpeakerPlayback::new(http)),
    })
}
