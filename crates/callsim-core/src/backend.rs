//! Boundary with the call backend and the speech service.

use crate::audio::AudioClip;
use crate::error::TransportError;
use async_trait::async_trait;

/// What the backend hands back when a test call is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedCall {
    pub call_id: String,
    pub greeting: String,
    /// Retrievable location of the greeting audio.
    pub greeting_audio: String,
}

/// Call lifecycle endpoints
#[async_trait]
pub trait CallBackend: Send + Sync {
    async fn start_test_call(&self, customer_id: &str) -> Result<StartedCall, TransportError>;

    async fn end_call(&self, call_id: &str, resolved: bool) -> Result<(), TransportError>;

    /// Deterministic URL of server-held audio for `(call_id, suffix)`.
    fn audio_url(&self, call_id: &str, suffix: &str) -> String;
}

/// Speech-to-text and text-to-speech
#[async_trait]
pub trait SpeechService: Send + Sync {
    async fn transcribe(&self, call_id: &str, clip: &AudioClip) -> Result<String, TransportError>;

    async fn synthesize(&self, text: &str) -> Result<AudioClip, TransportError>;
}

/// `{base}/audio/{call_id}{suffix}`
pub fn audio_url(base_url: &str, call_id: &str, suffix: &str) -> String {
    format!("{}/audio/{}{}", base_url.trim_end_matches('/'), call_id, suffix)
}
