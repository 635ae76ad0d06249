//! Voice session state types

use crate::speech::SpeechError;
use serde::{Deserialize, Serialize};

/// Identifies one utterance handed to the speech engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaybackId(pub u64);

impl std::fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionState {
    /// Voice mode off, nothing in flight
    #[default]
    Idle,

    /// Voice mode on, nothing in flight, capture not running
    Ready,

    /// Capture running, transcript growing
    Listening,

    /// A turn is in flight with the backend
    Processing,

    /// Playing back an assistant response
    Speaking { playback: PlaybackId },

    /// Playing back the greeting after voice mode was entered
    Greeting { playback: PlaybackId },

    /// A speech engine failure, shown until cleared
    Error { error: SpeechError },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Ready => "ready",
            SessionState::Listening => "listening",
            SessionState::Processing => "processing",
            SessionState::Speaking { .. } => "speaking",
            SessionState::Greeting { .. } => "greeting",
            SessionState::Error { .. } => "error",
        }
    }

    /// Capture device in use
    pub fn is_capturing(&self) -> bool {
        matches!(self, SessionState::Listening)
    }

    /// Audio output in use
    pub fn is_playing(&self) -> bool {
        matches!(
            self,
            SessionState::Speaking { .. } | SessionState::Greeting { .. }
        )
    }

    /// The input surface is disabled in these states
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionState::Processing | SessionState::Speaking { .. } | SessionState::Greeting { .. }
        )
    }

    /// The playback this state is waiting on, if any
    pub fn playback(&self) -> Option<PlaybackId> {
        match self {
            SessionState::Speaking { playback } | SessionState::Greeting { playback } => {
                Some(*playback)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Microphone preference, independent of the session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicState {
    pub muted: bool,
}

impl Default for MicState {
    fn default() -> Self {
        Self { muted: true }
    }
}

/// Everything the voice controller owns
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VoiceSession {
    pub state: SessionState,
    pub mic: MicState,
    pub voice_mode: bool,
    /// Last engine error, kept for display after the state moves on
    pub last_error: Option<SpeechError>,
    next_playback: u64,
}

impl VoiceSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a fresh playback id
    pub(crate) fn allocate_playback(&mut self) -> PlaybackId {
        self.next_playback += 1;
        PlaybackId(self.next_playback)
    }

    /// Combinations the controller must never produce
    pub fn is_consistent(&self) -> bool {
        let capture_ok = !self.state.is_capturing() || (!self.mic.muted && self.voice_mode);
        let playback_ok = !self.state.is_playing() || self.voice_mode;
        let ready_ok = !matches!(self.state, SessionState::Ready) || self.voice_mode;
        let idle_ok = !matches!(self.state, SessionState::Idle) || (!self.voice_mode && self.mic.muted);
        capture_ok && playback_ok && ready_ok && idle_ok
    }
}

/// Immutable configuration of the controller
#[derive(Debug, Clone)]
pub struct VoiceContext {
    /// Spoken when voice mode is entered
    pub greeting: String,
    /// Whether the platform can capture and play back
    pub voice_available: bool,
}

/// Default greeting played on entering voice mode
pub const DEFAULT_GREETING: &str =
    "Hi, I'm listening. Unmute the microphone whenever you're ready to talk.";

impl VoiceContext {
    pub fn new(greeting: impl Into<String>, voice_available: bool) -> Self {
        Self {
            greeting: greeting.into(),
            voice_available,
        }
    }
}

impl Default for VoiceContext {
    fn default() -> Self {
        Self::new(DEFAULT_GREETING, true)
    }
}
