//! Audio payloads and the capture/playback seams.
//!
//! The controller never touches devices. It talks to an [`AudioCapture`] and an
//! [`AudioPlayback`] and hands them only what one exchange needs. Transient
//! buffers are tracked as [`AudioLease`]s so each one is released exactly once.

use crate::error::{CaptureError, PlaybackError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Where a clip came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioProvenance {
    Recorded,
    Synthesized,
}

/// One recorded or synthesized audio payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    /// Content hint, e.g. `audio/wav` or `audio/mpeg`.
    pub mime: String,
    pub provenance: AudioProvenance,
}

impl AudioClip {
    pub fn recorded(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
            provenance: AudioProvenance::Recorded,
        }
    }

    pub fn synthesized(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
            provenance: AudioProvenance::Synthesized,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File name used when uploading, derived from the mime hint.
    pub fn file_name(&self) -> &'static str {
        match self.mime.as_str() {
            "audio/mpeg" | "audio/mp3" => "audio.mp3",
            "audio/ogg" => "audio.ogg",
            "audio/webm" => "audio.webm",
            _ => "audio.wav",
        }
    }
}

/// What to play: an in-memory clip or a server-held resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    Clip(AudioClip),
    Remote(String),
}

/// Opaque token for an open capture. Consumed by stop/abort, so it can only be
/// closed once.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct CaptureHandle {
    id: u64,
}

impl CaptureHandle {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Microphone side of the call
#[async_trait]
pub trait AudioCapture: Send {
    /// Acquire the device and start buffering. Fails with `PermissionDenied` if the
    /// microphone cannot be opened and `AlreadyCapturing` if a handle is open.
    async fn start_capture(&mut self) -> Result<CaptureHandle, CaptureError>;

    /// Finalize whatever was buffered and release the device stream. The stream is
    /// released even when the clip is empty or finalizing fails.
    async fn stop_capture(&mut self, handle: CaptureHandle) -> Result<AudioClip, CaptureError>;

    /// Release the device without producing a clip.
    fn abort_capture(&mut self, handle: CaptureHandle);
}

/// Speaker side of the call
#[async_trait]
pub trait AudioPlayback: Send {
    /// Play `source` to completion. Resolves once when playback ends naturally and
    /// returns an error instead when it cannot start or finish.
    async fn play(&mut self, source: AudioSource) -> Result<(), PlaybackError>;

    /// Halt playback and release anything still held.
    fn stop(&mut self);
}

/// Counts transient audio allocations and their releases.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    next_id: AtomicU64,
    allocated: AtomicUsize,
    released: AtomicUsize,
}

impl ResourceLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new transient resource.
    pub fn lease(self: &Arc<Self>, label: impl Into<String>) -> AudioLease {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.allocated.fetch_add(1, Ordering::SeqCst);
        let label = label.into();
        debug!("lease #{} allocated ({})", id, label);
        AudioLease {
            id,
            label,
            ledger: Arc::clone(self),
            released: false,
        }
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Leases allocated and not yet released.
    pub fn outstanding(&self) -> usize {
        self.allocated() - self.released()
    }
}

/// Handle on one transient buffer (decoded audio, fetched remote bytes).
///
/// `release` is idempotent; dropping an unreleased lease releases it.
#[derive(Debug)]
pub struct AudioLease {
    id: u64,
    label: String,
    ledger: Arc<ResourceLedger>,
    released: bool,
}

impl AudioLease {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Release the resource. Returns `false` when it was already released.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.ledger.released.fetch_add(1, Ordering::SeqCst);
        debug!("lease #{} released ({})", self.id, self.label);
        true
    }
}

impl Drop for AudioLease {
    fn drop(&mut self) {
        self.release();
    }
}
