//! Derived operator view: which controls are live and what to show.
//!
//! Nothing here is state. It is recomputed from the session and transcript.

use crate::dialogue::DialogueStep;
use crate::error::FaultClass;
use crate::session::{CallSession, CallState, Resolved};
use crate::transcript::Transcript;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewState {
    pub state: CallState,
    pub status: &'static str,
    pub can_start: bool,
    pub can_play_greeting: bool,
    pub can_record: bool,
    pub can_stop_recording: bool,
    pub can_end_call: bool,
    pub can_retry: bool,
    /// An operation is in flight; every control waits for it.
    pub busy: bool,
    /// The dialogue reached `end_call`; the operator should wrap up.
    pub end_call_suggested: bool,
    pub last_transcribed: Option<String>,
    pub error: Option<String>,
    pub error_class: Option<FaultClass>,
    pub error_hint: Option<&'static str>,
    /// Final outcome, once ended.
    pub outcome: Option<Resolved>,
}

impl ViewState {
    pub fn derive(session: &CallSession, transcript: &Transcript, closed: bool) -> Self {
        let state = session.state;
        let live = !closed;
        let exchanged = transcript.has_exchange();
        Self {
            state,
            status: if closed { "Closed" } else { state.label() },
            can_start: live && state == CallState::Idle,
            can_play_greeting: live && state == CallState::GreetingReady,
            can_record: live && state == CallState::WaitingInput,
            can_stop_recording: live && state == CallState::Recording,
            can_end_call: live
                && exchanged
                && matches!(state, CallState::WaitingInput | CallState::Error),
            can_retry: live && state == CallState::Error,
            busy: live && state.is_transient(),
            end_call_suggested: live
                && state == CallState::WaitingInput
                && session.dialogue.step == DialogueStep::EndCall,
            last_transcribed: session.last_transcribed.clone(),
            error: session.fault.as_ref().map(|f| f.message.clone()),
            error_class: session.fault.as_ref().map(|f| f.class),
            error_hint: session.fault.as_ref().map(|f| f.hint()),
            outcome: state.is_terminal().then_some(session.resolved),
        }
    }
}
