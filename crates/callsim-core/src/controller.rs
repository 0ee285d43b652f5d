//! Session Controller — the state machine that drives one simulated call.
//!
//! ```text
//!   start ──▶ Initiating ──▶ GreetingReady ──▶ PlayingGreeting ──▶ WaitingInput
//!                                                                   │   ▲
//!                       begin_recording / submit_text               ▼   │ playback done
//!                Recording ──▶ ProcessingInput ──▶ PlayingResponse ─────┘
//!                                                                   │
//!   end_call / dialogue completed ─────────────────────────────────▶ Ended
//! ```
//!
//! Every collaborator failure is caught here once and turned into the `Error`
//! state. Operations arriving in a state that does not accept them are rejected,
//! never queued.

use crate::audio::{AudioCapture, AudioClip, AudioPlayback, AudioSource, CaptureHandle};
use crate::backend::{CallBackend, SpeechService};
use crate::config::{CallSimConfig, SessionConfig};
use crate::dialogue::{DialogueEngine, DialogueState, DialogueStep};
use crate::error::{CallError, CallResult, SessionFault, TransportError};
use crate::http::HttpBackend;
use crate::session::{CallSession, CallState, Resolved};
use crate::transcript::{Speaker, Transcript};
use crate::view::ViewState;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Device adapters handed to the controller
pub struct AudioDevices {
    pub capture: Box<dyn AudioCapture>,
    pub playback: Box<dyn AudioPlayback>,
}

/// Remote collaborators handed to the controller
pub struct Services {
    pub backend: Arc<dyn CallBackend>,
    pub speech: Arc<dyn SpeechService>,
    pub engine: DialogueEngine,
}

/// Requests a close from outside the controller.
///
/// A pending operation (playback, a network call) is interrupted at once and
/// tears the session down itself. Between operations the controller is not
/// running, so whoever owns it must call [`SessionController::apply_close`]
/// (or any operation) to release the microphone. [`SessionCloser::closed`]
/// resolves when that is due.
#[derive(Debug, Clone)]
pub struct SessionCloser {
    tx: Arc<watch::Sender<bool>>,
}

impl SessionCloser {
    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `close` has been called.
    pub async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only ends on a close.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Runs `fut` unless the session is closed first.
async fn until_closed<F: Future>(closed: &mut watch::Receiver<bool>, fut: F) -> Option<F::Output> {
    if *closed.borrow() {
        return None;
    }
    tokio::select! {
        out = fut => Some(out),
        sender_gone = async { closed.wait_for(|c| *c).await.is_err() } => {
            if sender_gone {
                // Nobody can close us any more.
                std::future::pending::<()>().await;
            }
            None
        }
    }
}

pub struct SessionController {
    customer_id: String,
    config: SessionConfig,
    backend: Arc<dyn CallBackend>,
    speech: Arc<dyn SpeechService>,
    engine: DialogueEngine,
    capture: Box<dyn AudioCapture>,
    playback: Box<dyn AudioPlayback>,
    session: CallSession,
    transcript: Transcript,
    open_capture: Option<CaptureHandle>,
    closer: SessionCloser,
    closed_rx: watch::Receiver<bool>,
    torn_down: bool,
    history: Vec<(CallState, CallState)>,
}

impl SessionController {
    pub fn new(
        customer_id: impl Into<String>,
        config: SessionConfig,
        services: Services,
        devices: AudioDevices,
    ) -> Self {
        let customer_id = customer_id.into();
        let (tx, closed_rx) = watch::channel(false);
        Self {
            session: CallSession::new(customer_id.clone()),
            customer_id,
            config,
            backend: services.backend,
            speech: services.speech,
            engine: services.engine,
            capture: devices.capture,
            playback: devices.playback,
            transcript: Transcript::new(),
            open_capture: None,
            closer: SessionCloser { tx: Arc::new(tx) },
            closed_rx,
            torn_down: false,
            history: Vec::new(),
        }
    }

    /// Wire the controller to an [`HttpBackend`] built from `config`.
    pub fn from_config(config: &CallSimConfig, devices: AudioDevices) -> Result<Self, TransportError> {
        let http = HttpBackend::new(&config.backend)?;
        let engine = DialogueEngine::new(config.dialogue.clone(), Box::new(http.clone()));
        let http = Arc::new(http);
        let services = Services {
            backend: http.clone(),
            speech: http,
            engine,
        };
        Ok(Self::new(
            config.backend.customer_id.clone(),
            config.session.clone(),
            services,
            devices,
        ))
    }

    pub fn state(&self) -> CallState {
        self.session.state
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    pub fn dialogue_step(&self) -> DialogueStep {
        self.session.dialogue.step
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn fault(&self) -> Option<&SessionFault> {
        self.session.fault.as_ref()
    }

    /// True once the session was torn down and its devices released.
    pub fn is_closed(&self) -> bool {
        self.torn_down
    }

    /// A close was requested through the [`SessionCloser`].
    pub fn close_requested(&self) -> bool {
        self.closer.is_closed()
    }

    /// Tear down if the closer fired. Returns whether the session is closed.
    pub fn apply_close(&mut self) -> bool {
        if self.closer.is_closed() {
            self.teardown();
        }
        self.torn_down
    }

    /// Transitions taken since the current call was started, oldest first.
    pub fn history(&self) -> &[(CallState, CallState)] {
        &self.history
    }

    pub fn closer(&self) -> SessionCloser {
        self.closer.clone()
    }

    pub fn view(&self) -> ViewState {
        ViewState::derive(&self.session, &self.transcript, self.is_closed())
    }

    // ---------------------------------------------------------------------
    // Operator operations
    // ---------------------------------------------------------------------

    /// Open a new test call. Valid from `Idle` and `Error`; a previous call's
    /// identity and transcript are discarded.
    pub async fn start(&mut self) -> CallResult<()> {
        self.require("start", &[CallState::Idle, CallState::Error])?;
        self.release_capture();
        self.history.clear();
        self.transition(CallState::Initiating, None)?;
        self.session = CallSession {
            state: CallState::Initiating,
            ..CallSession::new(self.customer_id.clone())
        };
        self.transcript = Transcript::new();
        info!("📞 initiating test call for customer {}", self.customer_id);

        let mut closed = self.closed_rx.clone();
        let outcome = until_closed(&mut closed, self.backend.start_test_call(&self.customer_id)).await;
        let started = match outcome {
            None => return Err(self.abandon()),
            Some(Err(e)) => return Err(self.fail(e.into(), None)),
            Some(Ok(started)) => started,
        };

        self.session.id = Some(started.call_id);
        self.session.greeting_audio = Some(started.greeting_audio);
        self.transition(CallState::GreetingReady, None)?;
        self.transcript.append(Speaker::Ai, started.greeting);

        if self.config.autoplay_greeting {
            self.play_greeting().await
        } else {
            Ok(())
        }
    }

    /// Play the greeting of a freshly started call.
    pub async fn play_greeting(&mut self) -> CallResult<()> {
        self.require("play_greeting", &[CallState::GreetingReady])?;
        let url = self.session.greeting_audio.clone().ok_or(CallError::NoSession)?;
        self.transition(CallState::PlayingGreeting, None)?;
        self.play(AudioSource::Remote(url)).await?;
        self.transition(CallState::WaitingInput, None)
    }

    /// Open the microphone for the operator's reply.
    pub async fn begin_recording(&mut self) -> CallResult<()> {
        self.require("begin_recording", &[CallState::WaitingInput])?;
        match self.capture.start_capture().await {
            Ok(handle) => {
                self.open_capture = Some(handle);
                self.transition(CallState::Recording, None)
            }
            Err(e) => {
                warn!("🎤 microphone unavailable: {}", e);
                Err(self.fail(e.into(), None))
            }
        }
    }

    /// Finish the recording and run the exchange with the captured clip.
    pub async fn stop_recording(&mut self) -> CallResult<()> {
        self.require("stop_recording", &[CallState::Recording])?;
        let handle = self.open_capture.take().ok_or(CallError::InvalidState {
            operation: "stop_recording",
            state: self.session.state,
        })?;
        let clip = match self.capture.stop_capture(handle).await {
            Ok(clip) => clip,
            Err(e) => return Err(self.fail(e.into(), None)),
        };
        self.submit_recording(clip).await
    }

    /// Drop the current recording and go back to waiting.
    pub fn cancel_recording(&mut self) -> CallResult<()> {
        self.require("cancel_recording", &[CallState::Recording])?;
        self.release_capture();
        self.transition(CallState::WaitingInput, None)
    }

    /// Transcribe `clip`, advance the dialogue and play the answer.
    pub async fn submit_recording(&mut self, clip: AudioClip) -> CallResult<()> {
        self.require("submit_recording", &[CallState::Recording])?;
        // A clip delivered directly still closes the microphone.
        self.release_capture();
        self.transition(CallState::ProcessingInput, None)?;

        let call_id = self.call_id()?;
        let mut closed = self.closed_rx.clone();
        let outcome = until_closed(&mut closed, self.speech.transcribe(&call_id, &clip)).await;
        drop(clip);
        let text = match outcome {
            None => return Err(self.abandon()),
            Some(Err(e)) => return Err(self.fail(e.into(), None)),
            Some(Ok(text)) => text,
        };
        self.exchange(call_id, text).await
    }

    /// Typed reply instead of a recording.
    pub async fn submit_text(&mut self, text: &str) -> CallResult<()> {
        self.require("submit_text", &[CallState::WaitingInput])?;
        self.transition(CallState::ProcessingInput, None)?;
        let call_id = self.call_id()?;
        self.exchange(call_id, text.trim().to_string()).await
    }

    /// Report the outcome and end the call. Needs at least one User/AI exchange.
    pub async fn end_call(&mut self, resolved: bool) -> CallResult<()> {
        self.require("end_call", &[CallState::WaitingInput, CallState::Error])?;
        if !self.transcript.has_exchange() {
            return Err(CallError::NoExchange);
        }
        self.conclude(resolved).await
    }

    /// Start over after an error with a brand-new call.
    pub async fn retry(&mut self) -> CallResult<()> {
        self.require("retry", &[CallState::Error])?;
        info!("🔁 retrying with a new call");
        self.start().await
    }

    /// Same as [`retry`](Self::retry).
    pub async fn reset(&mut self) -> CallResult<()> {
        self.retry().await
    }

    /// Close the session view. Releases the microphone and any playback, discards
    /// the session and rejects every later operation.
    pub fn close(&mut self) {
        self.closer.close();
        self.teardown();
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    async fn exchange(&mut self, call_id: String, user_text: String) -> CallResult<()> {
        self.session.last_transcribed = Some(user_text.clone());
        self.transcript.append(Speaker::User, user_text.clone());

        let mut closed = self.closed_rx.clone();
        let dialogue = self.session.dialogue.clone();
        let outcome = until_closed(
            &mut closed,
            self.engine.next(&call_id, &dialogue, &user_text),
        )
        .await;
        let turn = match outcome {
            None => return Err(self.abandon()),
            Some(Err(e)) => return Err(self.fail(e.into(), None)),
            Some(Ok(turn)) => turn,
        };

        // Written before any audio work so the transcript survives audio failures.
        self.transcript.append(Speaker::Ai, turn.ai_text.clone());
        if let Some(verdict) = turn.resolved {
            self.session.resolved = Resolved::from(verdict);
        }
        let next = turn.state;

        let outcome = until_closed(&mut closed, self.speech.synthesize(&turn.ai_text)).await;
        let clip = match outcome {
            None => return Err(self.abandon()),
            Some(Err(e)) => return Err(self.fail(e.into(), Some(next))),
            Some(Ok(clip)) => clip,
        };

        let completed = next.step == DialogueStep::Completed;
        self.transition(CallState::PlayingResponse, Some(next))?;
        self.play(AudioSource::Clip(clip)).await?;

        if completed {
            let verdict = self.session.resolved.as_bool().unwrap_or(false);
            info!("🏁 dialogue completed, closing call (resolved: {})", verdict);
            self.conclude(verdict).await
        } else {
            self.transition(CallState::WaitingInput, None)
        }
    }

    async fn conclude(&mut self, resolved: bool) -> CallResult<()> {
        let call_id = self.call_id()?;
        let mut closed = self.closed_rx.clone();
        let outcome = until_closed(&mut closed, self.backend.end_call(&call_id, resolved)).await;
        match outcome {
            None => return Err(self.abandon()),
            Some(Err(e)) => return Err(self.fail(e.into(), None)),
            Some(Ok(())) => {}
        }

        self.session.resolved = Resolved::from(resolved);
        self.session.ended_at = Some(Utc::now());
        self.transcript
            .append(Speaker::System, format!("Call ended. Resolved: {}", resolved));
        self.transition(CallState::Ended, None)?;
        info!("📴 call {} ended ({})", call_id, self.session.resolved.label());
        Ok(())
    }

    async fn play(&mut self, source: AudioSource) -> CallResult<()> {
        let mut closed = self.closed_rx.clone();
        let outcome = until_closed(&mut closed, self.playback.play(source)).await;
        match outcome {
            None => Err(self.abandon()),
            Some(Err(e)) => {
                warn!("🔇 playback failed: {}", e);
                Err(self.fail(e.into(), None))
            }
            Some(Ok(())) => Ok(()),
        }
    }

    fn call_id(&self) -> CallResult<String> {
        self.session.id.clone().ok_or(CallError::NoSession)
    }

    /// Reject unless open and in one of `allowed`.
    fn require(&mut self, operation: &'static str, allowed: &[CallState]) -> CallResult<()> {
        if self.apply_close() {
            return Err(CallError::Closed);
        }
        let state = self.session.state;
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(CallError::InvalidState { operation, state })
        }
    }

    /// The only place `state` and `dialogue` change.
    fn transition(&mut self, to: CallState, dialogue: Option<DialogueState>) -> CallResult<()> {
        let from = self.session.state;
        if !from.can_transition_to(to) {
            return Err(CallError::InvalidTransition { from, to });
        }
        self.session.state = to;
        self.history.push((from, to));
        if let Some(dialogue) = dialogue {
            self.session.dialogue = dialogue;
        }
        info!(
            "🔀 {} -> {} (step: {})",
            from, to, self.session.dialogue.step
        );
        Ok(())
    }

    fn fail(&mut self, fault: SessionFault, dialogue: Option<DialogueState>) -> CallError {
        warn!("❌ call failed in {}: {}", self.session.state, fault);
        self.release_capture();
        if let Err(e) = self.transition(CallState::Error, dialogue) {
            warn!("{}", e);
        }
        self.session.fault = Some(fault.clone());
        CallError::Faulted(fault)
    }

    fn abandon(&mut self) -> CallError {
        info!("🚪 session closed mid-operation in {}", self.session.state);
        self.teardown();
        CallError::Closed
    }

    fn release_capture(&mut self) {
        if let Some(handle) = self.open_capture.take() {
            self.capture.abort_capture(handle);
        }
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.release_capture();
        self.playback.stop();
        self.session = CallSession::new(self.customer_id.clone());
        info!("🧹 session view closed");
    }
}
