//! Speaker playback using Rodio
//!
//! `OutputStream` is !Send, so every clip is decoded and played on a blocking
//! task that owns the stream. The task and `stop()` share a [`PlayControl`]
//! registered before the task is spawned, so a stop that lands while the
//! device is still opening is never lost.

use async_trait::async_trait;
use callsim_core::{
    AudioClip, AudioLease, AudioPlayback, AudioSource, HttpBackend, PlaybackError,
    ResourceLedger,
};
use rodio::{Decoder, OutputStream, Sink, Source};
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Default)]
struct PlayControl {
    stopped: bool,
    sink: Option<Arc<Sink>>,
}

type SharedControl = Arc<Mutex<PlayControl>>;

fn lock(control: &Mutex<PlayControl>) -> MutexGuard<'_, PlayControl> {
    control.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Default output device as an [`AudioPlayback`]
pub struct SpeakerPlayback {
    http: HttpBackend,
    ledger: Arc<ResourceLedger>,
    current: Option<SharedControl>,
}

impl SpeakerPlayback {
    /// `http` fetches server-held audio such as the greeting.
    pub fn new(http: HttpBackend) -> Self {
        Self {
            http,
            ledger: ResourceLedger::new(),
            current: None,
        }
    }

    /// Tracks every decoded clip; `outstanding()` is zero when nothing is playing.
    pub fn ledger(&self) -> Arc<ResourceLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn is_playing(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|c| lock(c).sink.as_ref().is_some_and(|s| !s.empty()))
    }

    async fn resolve(&self, source: AudioSource) -> Result<(AudioClip, String), PlaybackError> {
        match source {
            AudioSource::Clip(clip) => Ok((clip, "response".to_string())),
            AudioSource::Remote(url) => {
                debug!("fetching {}", url);
                let clip = self
                    .http
                    .fetch_audio(&url)
                    .await
                    .map_err(|e| PlaybackError::Fetch(e.to_string()))?;
                Ok((clip, url))
            }
        }
    }
}

/// Reject clips rodio cannot possibly decode before touching the device.
pub fn check_playable(clip: &AudioClip) -> Result<(), PlaybackError> {
    if !clip.mime.starts_with("audio/") {
        return Err(PlaybackError::Unsupported(clip.mime.clone()));
    }
    if clip.is_empty() {
        return Err(PlaybackError::Decode("empty audio".to_string()));
    }
    Ok(())
}

/// Play `bytes` to completion on the current (blocking) thread.
///
/// `lease` lives exactly as long as the audio does.
fn play_blocking(
    bytes: Vec<u8>,
    control: SharedControl,
    lease: AudioLease,
) -> Result<(), PlaybackError> {
    if lock(&control).stopped {
        return Err(PlaybackError::Stopped);
    }
    let (_stream, stream_handle) =
        OutputStream::try_default().map_err(|e| PlaybackError::Unavailable(e.to_string()))?;
    let sink = Sink::try_new(&stream_handle)
        .map(Arc::new)
        .map_err(|e| PlaybackError::Unavailable(e.to_string()))?;
    let source = Decoder::new(Cursor::new(bytes))
        .map_err(|e| PlaybackError::Decode(format!("Decode failed: {}", e)))?;

    {
        let mut control = lock(&control);
        // Stopped while the device was opening.
        if control.stopped {
            return Err(PlaybackError::Stopped);
        }
        sink.append(source.convert_samples::<f32>());
        control.sink = Some(Arc::clone(&sink));
    }
    info!("🔊 playing {}", lease.label());
    sink.sleep_until_end();

    let stopped = lock(&control).stopped;
    drop(lease);
    if stopped {
        Err(PlaybackError::Stopped)
    } else {
        Ok(())
    }
}

#[async_trait]
impl AudioPlayback for SpeakerPlayback {
    async fn play(&mut self, source: AudioSource) -> Result<(), PlaybackError> {
        let (clip, label) = self.resolve(source).await?;
        check_playable(&clip)?;

        let lease = self.ledger.lease(label);
        let control = SharedControl::default();
        self.current = Some(Arc::clone(&control));
        let task = tokio::task::spawn_blocking(move || play_blocking(clip.bytes, control, lease));

        let result = task
            .await
            .map_err(|e| PlaybackError::Unavailable(e.to_string()))
            .and_then(|r| r);
        self.current = None;
        result
    }

    fn stop(&mut self) {
        if let Some(control) = self.current.take() {
            let mut control = lock(&control);
            control.stopped = true;
            if let Some(sink) = control.sink.take() {
                sink.stop();
            }
            info!("⏹️ Audio playback stopped");
        }
    }
}

impl Drop for SpeakerPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
