//! Call session model and the declared state transitions.

use crate::dialogue::{DialogueState, DialogueStep};
use crate::error::SessionFault;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one simulated call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Idle,
    Initiating,
    GreetingReady,
    PlayingGreeting,
    WaitingInput,
    Recording,
    ProcessingInput,
    PlayingResponse,
    Ended,
    Error,
}

impl CallState {
    pub const ALL: [CallState; 10] = [
        CallState::Idle,
        CallState::Initiating,
        CallState::GreetingReady,
        CallState::PlayingGreeting,
        CallState::WaitingInput,
        CallState::Recording,
        CallState::ProcessingInput,
        CallState::PlayingResponse,
        CallState::Ended,
        CallState::Error,
    ];

    /// Whether `self -> to` is one of the declared transitions.
    pub fn can_transition_to(self, to: CallState) -> bool {
        use CallState::*;
        match (self, to) {
            (Ended, _) => false,
            (Idle, Error) => false,
            (_, Error) => true,
            (Idle, Initiating) => true,
            (Initiating, GreetingReady) => true,
            (GreetingReady, PlayingGreeting) => true,
            (PlayingGreeting, WaitingInput) => true,
            (WaitingInput, Recording | ProcessingInput | Ended) => true,
            (Recording, ProcessingInput | WaitingInput) => true,
            (ProcessingInput, PlayingResponse) => true,
            (PlayingResponse, WaitingInput | Ended) => true,
            (Error, Initiating | Ended) => true,
            _ => false,
        }
    }

    /// States in which the controller is mid-operation and rejects new requests.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            CallState::Initiating
                | CallState::PlayingGreeting
                | CallState::Recording
                | CallState::ProcessingInput
                | CallState::PlayingResponse
        )
    }

    pub fn is_terminal(self) -> bool {
        self == CallState::Ended
    }

    /// Status line shown to the operator.
    pub fn label(self) -> &'static str {
        match self {
            CallState::Idle => "Ready to start a test call",
            CallState::Initiating => "Initiating test call...",
            CallState::GreetingReady => "Greeting ready",
            CallState::PlayingGreeting | CallState::PlayingResponse => "AI Speaking...",
            CallState::WaitingInput => "Waiting for your response",
            CallState::Recording => "Recording...",
            CallState::ProcessingInput => "Processing...",
            CallState::Ended => "Call Ended.",
            CallState::Error => "Error",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::Idle => "idle",
            CallState::Initiating => "initiating",
            CallState::GreetingReady => "greeting_ready",
            CallState::PlayingGreeting => "playing_greeting",
            CallState::WaitingInput => "waiting_input",
            CallState::Recording => "recording",
            CallState::ProcessingInput => "processing_input",
            CallState::PlayingResponse => "playing_response",
            CallState::Ended => "ended",
            CallState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Tri-state call outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolved {
    #[default]
    Unknown,
    Yes,
    No,
}

impl Resolved {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Resolved::Unknown => None,
            Resolved::Yes => Some(true),
            Resolved::No => Some(false),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Resolved::Yes => "Resolved",
            Resolved::No | Resolved::Unknown => "Not Resolved / Escalated",
        }
    }
}

impl From<bool> for Resolved {
    fn from(value: bool) -> Self {
        if value {
            Resolved::Yes
        } else {
            Resolved::No
        }
    }
}

/// One simulated call, owned by the controller
#[derive(Debug, Clone, Serialize)]
pub struct CallSession {
    /// Issued by the backend once the call is initiated.
    pub id: Option<String>,
    pub customer_id: String,
    pub state: CallState,
    pub dialogue: DialogueState,
    pub resolved: Resolved,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Server-held greeting audio for this call.
    pub greeting_audio: Option<String>,
    /// Most recent user transcription.
    pub last_transcribed: Option<String>,
    pub fault: Option<SessionFault>,
}

impl CallSession {
    pub fn new(customer_id: impl Into<String>) -> Self {
        Self {
            id: None,
            customer_id: customer_id.into(),
            state: CallState::Idle,
            dialogue: DialogueState::default(),
            resolved: Resolved::Unknown,
            started_at: Utc::now(),
            ended_at: None,
            greeting_audio: None,
            last_transcribed: None,
            fault: None,
        }
    }

    pub fn step(&self) -> DialogueStep {
        self.dialogue.step
    }

    pub fn call_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}
