//! Speech capture and playback abstraction
//!
//! The capture device and the audio output are process-wide resources. Every
//! platform backend sits behind [`SpeechEngine`] and only the voice runtime calls
//! its mutating methods.

mod process;
mod unsupported;

pub use process::{ProcessSpeechEngine, SpeechCommand};
pub use unsupported::UnsupportedSpeechEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Classification of speech failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechErrorKind {
    /// Hardware access refused
    PermissionDenied,
    /// Platform lacks capture or playback
    NotSupported,
    NetworkError,
    RecognitionFailed,
    TtsFailed,
}

impl std::fmt::Display for SpeechErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SpeechErrorKind::PermissionDenied => "permission_denied",
            SpeechErrorKind::NotSupported => "not_supported",
            SpeechErrorKind::NetworkError => "network_error",
            SpeechErrorKind::RecognitionFailed => "recognition_failed",
            SpeechErrorKind::TtsFailed => "tts_failed",
        };
        f.write_str(name)
    }
}

/// Speech error with classification
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct SpeechError {
    pub kind: SpeechErrorKind,
    pub message: String,
}

impl SpeechError {
    pub fn new(kind: SpeechErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(SpeechErrorKind::PermissionDenied, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(SpeechErrorKind::NotSupported, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SpeechErrorKind::NetworkError, message)
    }

    pub fn recognition_failed(message: impl Into<String>) -> Self {
        Self::new(SpeechErrorKind::RecognitionFailed, message)
    }

    pub fn tts_failed(message: impl Into<String>) -> Self {
        Self::new(SpeechErrorKind::TtsFailed, message)
    }
}

/// What the platform can do, probed once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    pub capture: bool,
    pub playback: bool,
}

impl Capabilities {
    /// Voice mode needs both directions
    pub fn voice_available(self) -> bool {
        self.capture && self.playback
    }
}

/// Output channel of a running capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// The full transcript captured so far
    Transcript { text: String },
    /// Capture stopped on its own with an error
    Failed { error: SpeechError },
    /// The recognizer finished by itself without being stopped
    Ended,
}

/// Speech capture (STT) and playback (TTS)
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    /// Begin capturing. Idempotent while a capture is running.
    async fn start_capture(&self) -> Result<(), SpeechError>;

    /// Stop capturing. Safe to call when not capturing; never reports a failure.
    fn stop_capture(&self);

    /// Speak `text`, replacing any in-flight playback.
    ///
    /// Capture is stopped before playback begins. Resolves when playback ends,
    /// is cancelled, or fails.
    async fn speak(&self, text: &str) -> Result<(), SpeechError>;

    /// Stop the current playback; its pending `speak` resolves.
    fn cancel_playback(&self);

    /// Subscribe to transcript growth of the current and future captures
    fn subscribe(&self) -> broadcast::Receiver<CaptureEvent>;
}

#[async_trait]
impl<T: SpeechEngine + ?Sized> SpeechEngine for Arc<T> {
    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    async fn start_capture(&self) -> Result<(), SpeechError> {
        (**self).start_capture().await
    }

    fn stop_capture(&self) {
        (**self).stop_capture();
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        (**self).speak(text).await
    }

    fn cancel_playback(&self) {
        (**self).cancel_playback();
    }

    fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        (**self).subscribe()
    }
}
