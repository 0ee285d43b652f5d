//! **HttpBackend** — JSON-over-HTTP client for the call backend.
//!
//! One client serves all three seams: call lifecycle ([`CallBackend`]), speech
//! ([`SpeechService`]) and the delegated dialogue steps ([`DialogueDelegate`]).

use crate::audio::AudioClip;
use crate::backend::{self, CallBackend, SpeechService, StartedCall};
use crate::config::BackendConfig;
use crate::dialogue::{DialogueDelegate, FeedbackReply, QuestionsReply};
use crate::error::TransportError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

#[derive(Serialize)]
struct StartCallRequest<'a> {
    #[serde(rename = "customerId")]
    customer_id: &'a str,
}

#[derive(Deserialize)]
struct StartCallResponse {
    #[serde(rename = "callSid")]
    call_sid: String,
    #[serde(default)]
    greeting: String,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    #[serde(alias = "text")]
    transcript: String,
}

#[derive(Serialize)]
struct QuestionsRequest<'a> {
    #[serde(rename = "callSid")]
    call_sid: &'a str,
    #[serde(rename = "userText")]
    user_text: &'a str,
    state: &'a Value,
}

#[derive(Deserialize)]
struct QuestionsResponse {
    #[serde(alias = "aiText")]
    response: String,
    #[serde(default)]
    state: Option<Value>,
    #[serde(rename = "isResolved", default)]
    is_resolved: Option<bool>,
}

#[derive(Serialize)]
struct FeedbackRequest<'a> {
    #[serde(rename = "callSid")]
    call_sid: &'a str,
    #[serde(rename = "userText")]
    user_text: &'a str,
}

#[derive(Deserialize)]
struct FeedbackResponse {
    #[serde(alias = "aiText")]
    response: String,
    #[serde(rename = "nextStep")]
    next_step: String,
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct EndCallRequest<'a> {
    #[serde(rename = "callSid")]
    call_sid: &'a str,
    #[serde(rename = "isResolved")]
    is_resolved: bool,
}

/// Client for the call backend at `base_url`
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn post_json<B, R>(&self, endpoint: &str, body: &B) -> Result<R, TransportError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(endpoint);
        debug!("POST {}", url);
        let res = self.client.post(&url).json(body).send().await?;
        let res = check_status(res).await?;
        res.json::<R>()
            .await
            .map_err(|e| TransportError::Decode(format!("{}: {}", endpoint, e)))
    }

    /// Download server-held audio (used for remote playback sources).
    pub async fn fetch_audio(&self, url: &str) -> Result<AudioClip, TransportError> {
        let res = self.client.get(url).send().await?;
        let res = check_status(res).await?;
        let mime = content_type(&res).unwrap_or_else(|| "audio/mpeg".to_string());
        let bytes = res.bytes().await?;
        Ok(AudioClip::synthesized(bytes.to_vec(), mime))
    }
}

fn content_type(res: &reqwest::Response) -> Option<String> {
    res.headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
}

/// Turn a non-2xx response into `TransportError::Status`, preferring the JSON
/// `message` or `error` field over the status text.
async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let fallback = status.canonical_reason().unwrap_or("request failed").to_string();
    let body = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .or_else(|| json.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or(fallback);
    warn!("backend returned {}: {}", status.as_u16(), message);
    Err(TransportError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl CallBackend for HttpBackend {
    async fn start_test_call(&self, customer_id: &str) -> Result<StartedCall, TransportError> {
        let res: StartCallResponse = self
            .post_json("/start-test-call", &StartCallRequest { customer_id })
            .await?;
        if res.call_sid.trim().is_empty() {
            return Err(TransportError::Decode("start-test-call returned an empty callSid".into()));
        }
        info!("📞 test call {} started for customer {}", res.call_sid, customer_id);
        let greeting_audio = self.audio_url(&res.call_sid, "");
        Ok(StartedCall {
            call_id: res.call_sid,
            greeting: res.greeting,
            greeting_audio,
        })
    }

    async fn end_call(&self, call_id: &str, resolved: bool) -> Result<(), TransportError> {
        let url = self.url("/end-call");
        let res = self
            .client
            .post(&url)
            .json(&EndCallRequest {
                call_sid: call_id,
                is_resolved: resolved,
            })
            .send()
            .await?;
        check_status(res).await?;
        Ok(())
    }

    fn audio_url(&self, call_id: &str, suffix: &str) -> String {
        backend::audio_url(&self.base_url, call_id, suffix)
    }
}

#[async_trait]
impl SpeechService for HttpBackend {
    async fn transcribe(&self, call_id: &str, clip: &AudioClip) -> Result<String, TransportError> {
        let part = reqwest::multipart::Part::bytes(clip.bytes.clone())
            .file_name(clip.file_name())
            .mime_str(&clip.mime)?;
        let form = reqwest::multipart::Form::new()
            .part("audio", part)
            .text("callSid", call_id.to_string());
        let res = self
            .client
            .post(self.url("/transcribe"))
            .multipart(form)
            .send()
            .await?;
        let res = check_status(res).await?;
        let parsed: TranscribeResponse = res
            .json()
            .await
            .map_err(|e| TransportError::Decode(format!("/transcribe: {}", e)))?;
        Ok(parsed.transcript.trim().to_string())
    }

    async fn synthesize(&self, text: &str) -> Result<AudioClip, TransportError> {
        let res = self
            .client
            .post(self.url("/synthesize"))
            .json(&SynthesizeRequest { text })
            .send()
            .await?;
        let res = check_status(res).await?;
        let mime = content_type(&res).unwrap_or_else(|| "audio/mpeg".to_string());
        if !mime.starts_with("audio/") {
            return Err(TransportError::Decode(format!(
                "/synthesize returned {} instead of audio",
                mime
            )));
        }
        let bytes = res.bytes().await?;
        Ok(AudioClip::synthesized(bytes.to_vec(), mime))
    }
}

#[async_trait]
impl DialogueDelegate for HttpBackend {
    async fn handle_questions(
        &self,
        call_id: &str,
        user_text: &str,
        aux: &Value,
    ) -> Result<QuestionsReply, TransportError> {
        let res: QuestionsResponse = self
            .post_json(
                "/handle-questions",
                &QuestionsRequest {
                    call_sid: call_id,
                    user_text,
                    state: aux,
                },
            )
            .await?;
        Ok(QuestionsReply {
            ai_text: res.response,
            aux: res.state.unwrap_or_else(|| Value::Object(Default::default())),
            resolved: res.is_resolved,
        })
    }

    async fn get_feedback(
        &self,
        call_id: &str,
        user_text: &str,
    ) -> Result<FeedbackReply, TransportError> {
        let res: FeedbackResponse = self
            .post_json(
                "/get-feedback",
                &FeedbackRequest {
                    call_sid: call_id,
                    user_text,
                },
            )
            .await?;
        Ok(FeedbackReply {
            ai_text: res.response,
            next_step: res.next_step,
        })
    }
}
