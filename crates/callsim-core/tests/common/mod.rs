//! Fakes for every collaborator of the Session Controller.
//!
//! Each fake is `Clone` over shared state so a test can keep a handle after the
//! controller has taken ownership of its copy.

#![allow(dead_code)]

use async_trait::async_trait;
use callsim_core::backend::audio_url;
use callsim_core::{
    AudioCapture, AudioClip, AudioDevices, AudioPlayback, AudioSource, CallBackend, CaptureError,
    CaptureHandle, DialogueConfig, DialogueDelegate, DialogueEngine, FeedbackReply, PlaybackError,
    QuestionsReply, ResourceLedger, Services, SessionConfig, SessionController, SpeechService,
    StartedCall, TransportError,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const GREETING: &str = "أهلا بيك، معاك خدمة العملاء. تحب نكمل في حل المشكلة؟";
pub const FAKE_BASE: &str = "http://fake/api";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// ---------------------------------------------------------------------------
// In-flight audio tracking shared by capture and playback
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct InFlight {
    inner: Arc<Mutex<(usize, usize)>>,
}

impl InFlight {
    fn enter(&self) {
        let mut g = self.inner.lock().unwrap();
        g.0 += 1;
        g.1 = g.1.max(g.0);
    }

    fn exit(&self) {
        let mut g = self.inner.lock().unwrap();
        g.0 = g.0.saturating_sub(1);
    }

    fn guard(&self) -> FlightGuard {
        self.enter();
        FlightGuard {
            flight: self.clone(),
        }
    }

    pub fn current(&self) -> usize {
        self.inner.lock().unwrap().0
    }

    pub fn max(&self) -> usize {
        self.inner.lock().unwrap().1
    }
}

struct FlightGuard {
    flight: InFlight,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flight.exit();
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BackendInner {
    next_call: u32,
    fail_starts: u32,
    fail_end: bool,
    started: Vec<String>,
    ended: Vec<(String, bool)>,
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Mutex<BackendInner>>,
}

impl FakeBackend {
    /// Fail the next `n` start requests.
    pub fn fail_starts(&self, n: u32) {
        self.inner.lock().unwrap().fail_starts = n;
    }

    pub fn fail_end(&self, fail: bool) {
        self.inner.lock().unwrap().fail_end = fail;
    }

    pub fn started(&self) -> Vec<String> {
        self.inner.lock().unwrap().started.clone()
    }

    pub fn ended(&self) -> Vec<(String, bool)> {
        self.inner.lock().unwrap().ended.clone()
    }
}

#[async_trait]
impl CallBackend for FakeBackend {
    async fn start_test_call(&self, _customer_id: &str) -> Result<StartedCall, TransportError> {
        let mut g = self.inner.lock().unwrap();
        if g.fail_starts > 0 {
            g.fail_starts -= 1;
            return Err(TransportError::Status {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }
        g.next_call += 1;
        let call_id = format!("CA{}", g.next_call);
        g.started.push(call_id.clone());
        Ok(StartedCall {
            greeting_audio: audio_url(FAKE_BASE, &call_id, ""),
            call_id,
            greeting: GREETING.to_string(),
        })
    }

    async fn end_call(&self, call_id: &str, resolved: bool) -> Result<(), TransportError> {
        let mut g = self.inner.lock().unwrap();
        if g.fail_end {
            return Err(TransportError::Status {
                status: 500,
                message: "end-call failed".to_string(),
            });
        }
        g.ended.push((call_id.to_string(), resolved));
        Ok(())
    }

    fn audio_url(&self, call_id: &str, suffix: &str) -> String {
        audio_url(FAKE_BASE, call_id, suffix)
    }
}

// ---------------------------------------------------------------------------
// Speech
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SpeechInner {
    transcripts: VecDeque<String>,
    fail_transcribe: bool,
    fail_synthesize: bool,
    synthesized: Vec<String>,
    clips_received: usize,
}

#[derive(Clone, Default)]
pub struct FakeSpeech {
    inner: Arc<Mutex<SpeechInner>>,
}

impl FakeSpeech {
    /// Queue what the next recordings will be transcribed as.
    pub fn will_hear(&self, text: &str) {
        self.inner
            .lock()
            .unwrap()
            .transcripts
            .push_back(text.to_string());
    }

    pub fn fail_transcribe(&self, fail: bool) {
        self.inner.lock().unwrap().fail_transcribe = fail;
    }

    pub fn fail_synthesize(&self, fail: bool) {
        self.inner.lock().unwrap().fail_synthesize = fail;
    }

    pub fn synthesized(&self) -> Vec<String> {
        self.inner.lock().unwrap().synthesized.clone()
    }

    pub fn clips_received(&self) -> usize {
        self.inner.lock().unwrap().clips_received
    }
}

#[async_trait]
impl SpeechService for FakeSpeech {
    async fn transcribe(&self, _call_id: &str, _clip: &AudioClip) -> Result<String, TransportError> {
        let mut g = self.inner.lock().unwrap();
        g.clips_received += 1;
        if g.fail_transcribe {
            return Err(TransportError::Status {
                status: 502,
                message: "speech service down".to_string(),
            });
        }
        Ok(g.transcripts.pop_front().unwrap_or_default())
    }

    /// The "audio" is the UTF-8 text, so tests can tell which utterance was played.
    async fn synthesize(&self, text: &str) -> Result<AudioClip, TransportError> {
        let mut g = self.inner.lock().unwrap();
        if g.fail_synthesize {
            return Err(TransportError::Status {
                status: 502,
                message: "tts quota exceeded".to_string(),
            });
        }
        g.synthesized.push(text.to_string());
        Ok(AudioClip::synthesized(text.as_bytes().to_vec(), "audio/mpeg"))
    }
}

// ---------------------------------------------------------------------------
// Dialogue delegate
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DelegateInner {
    questions: VecDeque<QuestionsReply>,
    feedback: VecDeque<FeedbackReply>,
    fail: bool,
    seen_aux: Vec<Value>,
}

#[derive(Clone, Default)]
pub struct FakeDelegate {
    inner: Arc<Mutex<DelegateInner>>,
}

impl FakeDelegate {
    pub fn reply_questions(&self, reply: QuestionsReply) {
        self.inner.lock().unwrap().questions.push_back(reply);
    }

    pub fn reply_feedback(&self, reply: FeedbackReply) {
        self.inner.lock().unwrap().feedback.push_back(reply);
    }

    pub fn fail(&self, fail: bool) {
        self.inner.lock().unwrap().fail = fail;
    }

    pub fn seen_aux(&self) -> Vec<Value> {
        self.inner.lock().unwrap().seen_aux.clone()
    }
}

#[async_trait]
impl DialogueDelegate for FakeDelegate {
    async fn handle_questions(
        &self,
        _call_id: &str,
        _user_text: &str,
        aux: &Value,
    ) -> Result<QuestionsReply, TransportError> {
        let mut g = self.inner.lock().unwrap();
        g.seen_aux.push(aux.clone());
        if g.fail {
            return Err(TransportError::Decode("handle-questions exploded".to_string()));
        }
        g.questions
            .pop_front()
            .ok_or_else(|| TransportError::Decode("no scripted question reply".to_string()))
    }

    async fn get_feedback(
        &self,
        _call_id: &str,
        _user_text: &str,
    ) -> Result<FeedbackReply, TransportError> {
        let mut g = self.inner.lock().unwrap();
        if g.fail {
            return Err(TransportError::Decode("get-feedback exploded".to_string()));
        }
        g.feedback
            .pop_front()
            .ok_or_else(|| TransportError::Decode("no scripted feedback reply".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CaptureInner {
    deny: bool,
    open: Option<u64>,
    next: u64,
    opened: usize,
    released: usize,
}

#[derive(Clone, Default)]
pub struct FakeCapture {
    inner: Arc<Mutex<CaptureInner>>,
    flight: InFlight,
}

impl FakeCapture {
    pub fn deny(&self, deny: bool) {
        self.inner.lock().unwrap().deny = deny;
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().unwrap().open.is_some()
    }

    pub fn opened(&self) -> usize {
        self.inner.lock().unwrap().opened
    }

    pub fn released(&self) -> usize {
        self.inner.lock().unwrap().released
    }

    fn close(&self, id: u64) -> bool {
        let mut g = self.inner.lock().unwrap();
        if g.open == Some(id) {
            g.open = None;
            g.released += 1;
            drop(g);
            self.flight.exit();
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl AudioCapture for FakeCapture {
    async fn start_capture(&mut self) -> Result<CaptureHandle, CaptureError> {
        let mut g = self.inner.lock().unwrap();
        if g.deny {
            return Err(CaptureError::PermissionDenied(
                "NotAllowedError: Permission denied".to_string(),
            ));
        }
        if g.open.is_some() {
            return Err(CaptureError::AlreadyCapturing);
        }
        g.next += 1;
        g.opened += 1;
        g.open = Some(g.next);
        let id = g.next;
        drop(g);
        self.flight.enter();
        Ok(CaptureHandle::new(id))
    }

    async fn stop_capture(&mut self, handle: CaptureHandle) -> Result<AudioClip, CaptureError> {
        if !self.close(handle.id()) {
            return Err(CaptureError::UnknownHandle(handle.id()));
        }
        Ok(AudioClip::recorded(b"RIFF....WAVEfmt ".to_vec(), "audio/wav"))
    }

    fn abort_capture(&mut self, handle: CaptureHandle) {
        self.close(handle.id());
    }
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum PlayMode {
    Complete,
    Fail(PlaybackError),
    /// Never finishes on its own.
    Hang,
}

#[derive(Default)]
struct PlaybackInner {
    script: VecDeque<PlayMode>,
    played: Vec<AudioSource>,
    stops: usize,
}

#[derive(Clone)]
pub struct FakePlayback {
    inner: Arc<Mutex<PlaybackInner>>,
    ledger: Arc<ResourceLedger>,
    flight: InFlight,
}

impl FakePlayback {
    pub fn new(flight: InFlight) -> Self {
        Self {
            inner: Arc::default(),
            ledger: ResourceLedger::new(),
            flight,
        }
    }

    /// Behavior of the next plays, in order. Unscripted plays complete.
    pub fn script(&self, modes: impl IntoIterator<Item = PlayMode>) {
        self.inner.lock().unwrap().script.extend(modes);
    }

    pub fn played(&self) -> Vec<AudioSource> {
        self.inner.lock().unwrap().played.clone()
    }

    pub fn stops(&self) -> usize {
        self.inner.lock().unwrap().stops
    }

    pub fn ledger(&self) -> Arc<ResourceLedger> {
        Arc::clone(&self.ledger)
    }
}

#[async_trait]
impl AudioPlayback for FakePlayback {
    async fn play(&mut self, source: AudioSource) -> Result<(), PlaybackError> {
        let mode = {
            let mut g = self.inner.lock().unwrap();
            g.played.push(source.clone());
            g.script.pop_front().unwrap_or(PlayMode::Complete)
        };
        let label = match &source {
            AudioSource::Clip(_) => "response".to_string(),
            AudioSource::Remote(url) => url.clone(),
        };
        let mut lease = self.ledger.lease(label);
        let _flight = self.flight.guard();
        match mode {
            PlayMode::Complete => {
                tokio::task::yield_now().await;
                lease.release();
                Ok(())
            }
            PlayMode::Fail(e) => {
                lease.release();
                Err(e)
            }
            PlayMode::Hang => std::future::pending().await,
        }
    }

    fn stop(&mut self) {
        self.inner.lock().unwrap().stops += 1;
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub controller: SessionController,
    pub backend: FakeBackend,
    pub speech: FakeSpeech,
    pub delegate: FakeDelegate,
    pub capture: FakeCapture,
    pub playback: FakePlayback,
    pub flight: InFlight,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default(), DialogueConfig::default())
    }

    pub fn with_config(session: SessionConfig, dialogue: DialogueConfig) -> Self {
        init_tracing();
        let backend = FakeBackend::default();
        let speech = FakeSpeech::default();
        let delegate = FakeDelegate::default();
        let flight = InFlight::default();
        let capture = FakeCapture {
            inner: Arc::default(),
            flight: flight.clone(),
        };
        let playback = FakePlayback::new(flight.clone());

        let services = Services {
            backend: Arc::new(backend.clone()),
            speech: Arc::new(speech.clone()),
            engine: DialogueEngine::new(dialogue, Box::new(delegate.clone())),
        };
        let devices = AudioDevices {
            capture: Box::new(capture.clone()),
            playback: Box::new(playback.clone()),
        };
        let controller = SessionController::new("cust-1", session, services, devices);

        Self {
            controller,
            backend,
            speech,
            delegate,
            capture,
            playback,
            flight,
        }
    }

    /// Record one utterance through the microphone path.
    pub async fn say(&mut self, text: &str) -> callsim_core::CallResult<()> {
        self.speech.will_hear(text);
        self.controller.begin_recording().await?;
        self.controller.stop_recording().await
    }
}
