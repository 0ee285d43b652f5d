//! Microphone capture using CPAL
//!
//! The cpal `Stream` is !Send on some platforms, so each recording owns a
//! dedicated thread that opens the input, forwards samples over a channel and
//! drops the stream when told to stop.

use crate::error::{VoiceError, VoiceResult};
use crate::wav::{duration_secs, encode_wav};
use async_trait::async_trait;
use callsim_core::{AudioCapture, AudioClip, AudioSettings, CaptureError, CaptureHandle};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

struct ActiveCapture {
    id: u64,
    stop_tx: std_mpsc::Sender<()>,
    done_rx: oneshot::Receiver<()>,
    chunk_rx: mpsc::UnboundedReceiver<Vec<f32>>,
}

/// Default input device as an [`AudioCapture`]
pub struct MicrophoneCapture {
    settings: AudioSettings,
    next_id: u64,
    active: Option<ActiveCapture>,
}

impl MicrophoneCapture {
    pub fn new(settings: AudioSettings) -> Self {
        Self {
            settings,
            next_id: 0,
            active: None,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.active.is_some()
    }

    /// List available input devices
    pub fn list_input_devices() -> VoiceResult<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices()?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn take_active(&mut self, id: u64) -> Result<ActiveCapture, CaptureError> {
        match self.active.take() {
            Some(active) if active.id == id => Ok(active),
            other => {
                self.active = other;
                Err(CaptureError::UnknownHandle(id))
            }
        }
    }
}

/// Open the default input and forward every callback buffer to `chunk_tx`.
fn open_input_stream(
    settings: &AudioSettings,
    chunk_tx: mpsc::UnboundedSender<Vec<f32>>,
) -> VoiceResult<Stream> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| VoiceError::AudioDevice("No input device available".to_string()))?;
    info!(
        "📱 Using input device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    debug!("🔧 Default config: {:?}", device.default_input_config()?);

    let stream_config = StreamConfig {
        channels: settings.channels,
        sample_rate: cpal::SampleRate(settings.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let stream = device.build_input_stream(
        &stream_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            // Receiver gone means the recording was already collected.
            let _ = chunk_tx.send(data.to_vec());
        },
        move |err| {
            warn!("Audio stream error: {}", err);
        },
        None,
    )?;
    stream.play()?;
    Ok(stream)
}

#[async_trait]
impl AudioCapture for MicrophoneCapture {
    async fn start_capture(&mut self) -> Result<CaptureHandle, CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::AlreadyCapturing);
        }
        info!(
            "🎤 Opening microphone ({}Hz, {} channels)",
            self.settings.sample_rate, self.settings.channels
        );

        let (ready_tx, ready_rx) = oneshot::channel::<VoiceResult<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let settings = self.settings.clone();

        thread::Builder::new()
            .name("callsim-mic".to_string())
            .spawn(move || {
                let stream = match open_input_stream(&settings, chunk_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Blocks until stopped, or until the owner is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                let _ = done_tx.send(());
            })
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(VoiceError::CaptureThread("exited before opening".to_string()).into())
            }
        }

        self.next_id += 1;
        self.active = Some(ActiveCapture {
            id: self.next_id,
            stop_tx,
            done_rx,
            chunk_rx,
        });
        info!("✅ Audio capture started");
        Ok(CaptureHandle::new(self.next_id))
    }

    async fn stop_capture(&mut self, handle: CaptureHandle) -> Result<AudioClip, CaptureError> {
        let ActiveCapture {
            stop_tx,
            done_rx,
            mut chunk_rx,
            ..
        } = self.take_active(handle.id())?;
        let _ = stop_tx.send(());
        let _ = done_rx.await;

        let mut samples = Vec::new();
        while let Ok(chunk) = chunk_rx.try_recv() {
            samples.extend(chunk);
        }

        let AudioSettings {
            sample_rate,
            channels,
        } = self.settings;
        info!(
            "⏹️ Captured {:.1}s of audio",
            duration_secs(samples.len(), sample_rate, channels)
        );
        let wav = encode_wav(&samples, sample_rate, channels)?;
        Ok(AudioClip::recorded(wav, "audio/wav"))
    }

    fn abort_capture(&mut self, handle: CaptureHandle) {
        if let Ok(active) = self.take_active(handle.id()) {
            let _ = active.stop_tx.send(());
            info!("🛑 Recording discarded");
        }
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.stop_tx.send(());
        }
    }
}
