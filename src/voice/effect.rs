//! Effects produced by voice state transitions

use super::event::Utterance;
use super::state::PlaybackId;
use crate::speech::SpeechError;

/// What a playback is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackKind {
    Greeting,
    Response,
}

/// Effects to be executed after a state transition, in order
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEffect {
    /// Start the capture device
    StartCapture,

    /// Stop the capture device
    StopCapture,

    /// Drop any buffered transcript
    ResetTranscript,

    /// Play text through the speech engine
    Speak {
        playback: PlaybackId,
        text: String,
        kind: PlaybackKind,
    },

    /// Stop whatever is playing
    CancelPlayback,

    /// Hand an utterance to the conversation orchestrator
    Dispatch { utterance: Utterance },

    /// Cancel the in-flight backend request
    AbortTurn,

    /// Surface a dismissible error notice
    ShowNotice { error: SpeechError },
}

impl VoiceEffect {
    pub fn speak_greeting(playback: PlaybackId, text: impl Into<String>) -> Self {
        VoiceEffect::Speak {
            playback,
            text: text.into(),
            kind: PlaybackKind::Greeting,
        }
    }

    pub fn speak_response(playback: PlaybackId, text: impl Into<String>) -> Self {
        VoiceEffect::Speak {
            playback,
            text: text.into(),
            kind: PlaybackKind::Response,
        }
    }
}
