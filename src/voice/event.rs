//! Events that drive the voice controller

use super::state::PlaybackId;
use crate::speech::SpeechError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an utterance came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    Voice,
    Text,
}

/// A finalized chunk of user input, ready for dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub requested_at: DateTime<Utc>,
    pub mode: InputMode,
}

impl Utterance {
    pub fn new(text: impl Into<String>, mode: InputMode) -> Self {
        Self {
            text: text.into(),
            requested_at: Utc::now(),
            mode,
        }
    }
}

/// How a turn ended without a response to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The user cancelled the request
    Aborted,
    /// The backend failed; a fallback message was shown instead
    Failed,
}

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum VoiceEvent {
    // User events
    EnterVoiceMode,
    ExitVoiceMode,
    Mute,
    Unmute,
    ClearError,

    /// A voice utterance finalized by silence, or typed text
    Submitted { utterance: Utterance },

    // Orchestrator events
    /// The typewriter caught up with the completed response
    ResponseReady { text: String },
    TurnEnded { outcome: TurnOutcome },

    // Engine events
    PlaybackFinished { playback: PlaybackId },
    EngineError { error: SpeechError },
}
