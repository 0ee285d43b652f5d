//! # CallSim Core - Test-Call Simulation
//!
//! Drives one simulated inbound support call end-to-end: the operator speaks, the
//! backend transcribes and answers, the answer is synthesized and played back,
//! and the call ends with a resolution outcome.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Session Controller                         │
//! │  ┌────────────┐  ┌──────────────┐  ┌──────────────┐              │
//! │  │  Capture   │→ │ Speech (STT) │→ │   Dialogue   │──┐           │
//! │  │  (trait)   │  │   (trait)    │  │    Engine    │  │           │
//! │  └────────────┘  └──────────────┘  └──────────────┘  │           │
//! │         ↑                                    ↓        ↓           │
//! │  ┌────────────┐  ┌──────────────┐     ┌──────────────────┐       │
//! │  │  Playback  │← │ Speech (TTS) │     │    Transcript    │       │
//! │  │  (trait)   │  │   (trait)    │     │   (append-only)  │       │
//! │  └────────────┘  └──────────────┘     └──────────────────┘       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Device adapters live in `callsim-voice`; this crate has no audio hardware
//! dependencies and is fully testable with fakes.

pub mod audio;
pub mod backend;
pub mod config;
pub mod controller;
pub mod dialogue;
pub mod error;
pub mod http;
pub mod session;
pub mod transcript;
pub mod view;

pub use audio::{
    AudioCapture, AudioClip, AudioLease, AudioPlayback, AudioProvenance, AudioSource,
    CaptureHandle, ResourceLedger,
};
pub use backend::{CallBackend, SpeechService, StartedCall};
pub use config::{AudioSettings, BackendConfig, CallSimConfig, SessionConfig};
pub use controller::{AudioDevices, Services, SessionCloser, SessionController};
pub use dialogue::{
    DialogueConfig, DialogueDelegate, DialogueEngine, DialogueOutcome, DialogueScript,
    DialogueState, DialogueStep, DialogueTurn, FeedbackReply, Intent, QuestionsReply,
};
pub use error::{
    CallError, CallResult, CaptureError, FaultClass, PlaybackError, SessionFault, TransportError,
};
pub use http::HttpBackend;
pub use session::{CallSession, CallState, Resolved};
pub use transcript::{Speaker, Transcript, TranscriptCursor, TranscriptEntry};
pub use view::ViewState;
