//! Pure state transition function
//!
//! Given the same session, context and event this always produces the same
//! session and effects. All I/O happens in the runtime that executes the effects.

use super::{MicState, SessionState, VoiceContext, VoiceEffect, VoiceEvent, VoiceSession};
use crate::speech::SpeechError;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub session: VoiceSession,
    pub effects: Vec<VoiceEffect>,
}

impl TransitionResult {
    pub fn new(session: VoiceSession) -> Self {
        Self {
            session,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: VoiceEffect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = VoiceEffect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Assistant is busy, wait for the current response to finish")]
    Busy,
    #[error("Voice mode is not active")]
    VoiceModeInactive,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
#[allow(clippy::too_many_lines)] // One arm per row of the transition table
pub fn transition(
    session: &VoiceSession,
    context: &VoiceContext,
    event: VoiceEvent,
) -> Result<TransitionResult, TransitionError> {
    let mut next = session.clone();

    match (&session.state, event) {
        // ============================================================
        // Entering and leaving voice mode
        // ============================================================

        (_, VoiceEvent::EnterVoiceMode) if session.voice_mode => Ok(TransitionResult::new(next)),

        (SessionState::Processing, VoiceEvent::EnterVoiceMode) => Err(TransitionError::Busy),

        (_, VoiceEvent::EnterVoiceMode) if !context.voice_available => {
            let error = SpeechError::not_supported("Voice mode is not available on this platform");
            next.state = SessionState::Error {
                error: error.clone(),
            };
            next.last_error = Some(error.clone());
            Ok(TransitionResult::new(next).with_effect(VoiceEffect::ShowNotice { error }))
        }

        // Always starts muted, greeting follows the same capture-before-playback rule
        (_, VoiceEvent::EnterVoiceMode) => {
            let playback = next.allocate_playback();
            next.voice_mode = true;
            next.mic = MicState { muted: true };
            next.state = SessionState::Greeting { playback };
            next.last_error = None;
            Ok(TransitionResult::new(next).with_effects([
                VoiceEffect::StopCapture,
                VoiceEffect::ResetTranscript,
                VoiceEffect::speak_greeting(playback, &context.greeting),
            ]))
        }

        (_, VoiceEvent::ExitVoiceMode) if !session.voice_mode => Ok(TransitionResult::new(next)),

        (state, VoiceEvent::ExitVoiceMode) => {
            let was_processing = matches!(state, SessionState::Processing);
            next.voice_mode = false;
            next.mic = MicState { muted: true };
            next.state = SessionState::Idle;
            let mut result = TransitionResult::new(next).with_effects([
                VoiceEffect::StopCapture,
                VoiceEffect::CancelPlayback,
                VoiceEffect::ResetTranscript,
            ]);
            if was_processing {
                result = result.with_effect(VoiceEffect::AbortTurn);
            }
            Ok(result)
        }

        // ============================================================
        // Microphone
        // ============================================================

        (_, VoiceEvent::Unmute) if !session.voice_mode => Err(TransitionError::VoiceModeInactive),

        (SessionState::Error { .. }, VoiceEvent::Unmute) => Err(TransitionError::InvalidTransition(
            "Clear the error before unmuting".to_string(),
        )),

        (SessionState::Ready, VoiceEvent::Unmute) => {
            next.mic = MicState { muted: false };
            next.state = SessionState::Listening;
            Ok(TransitionResult::new(next).with_effect(VoiceEffect::StartCapture))
        }

        // Greeting, processing or speaking: remember the preference, capture
        // resumes only when playback completes
        (_, VoiceEvent::Unmute) => {
            next.mic = MicState { muted: false };
            Ok(TransitionResult::new(next))
        }

        (SessionState::Listening, VoiceEvent::Mute) => {
            next.mic = MicState { muted: true };
            next.state = SessionState::Ready;
            Ok(TransitionResult::new(next).with_effect(VoiceEffect::StopCapture))
        }

        (_, VoiceEvent::Mute) => {
            next.mic = MicState { muted: true };
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Submitting a turn
        // ============================================================

        (_, VoiceEvent::Submitted { utterance }) if utterance.text.trim().is_empty() => Err(
            TransitionError::InvalidTransition("Cannot submit an empty message".to_string()),
        ),

        (state, VoiceEvent::Submitted { .. }) if state.is_busy() => Err(TransitionError::Busy),

        // Every new utterance re-mutes the microphone before dispatch
        (state, VoiceEvent::Submitted { utterance }) => {
            let was_listening = state.is_capturing();
            next.mic = MicState { muted: true };
            next.state = SessionState::Processing;
            next.last_error = None;
            let mut result = TransitionResult::new(next);
            if was_listening {
                result = result.with_effects([VoiceEffect::StopCapture, VoiceEffect::ResetTranscript]);
            }
            Ok(result.with_effect(VoiceEffect::Dispatch { utterance }))
        }

        // ============================================================
        // Turn completion
        // ============================================================

        (SessionState::Processing, VoiceEvent::ResponseReady { text })
            if session.voice_mode && !text.trim().is_empty() =>
        {
            let playback = next.allocate_playback();
            next.state = SessionState::Speaking { playback };
            Ok(TransitionResult::new(next).with_effects([
                VoiceEffect::StopCapture,
                VoiceEffect::speak_response(playback, text),
            ]))
        }

        // Nothing to say: behave as if playback already finished
        (SessionState::Processing, VoiceEvent::ResponseReady { .. }) if session.voice_mode => {
            Ok(resume_after_playback(next))
        }

        (SessionState::Processing, VoiceEvent::ResponseReady { .. }) => {
            next.state = SessionState::Idle;
            Ok(TransitionResult::new(next))
        }

        (SessionState::Processing, VoiceEvent::TurnEnded { outcome }) => {
            tracing::debug!(?outcome, "Turn ended without a response");
            next.mic = MicState { muted: true };
            next.state = if session.voice_mode {
                SessionState::Ready
            } else {
                SessionState::Idle
            };
            Ok(TransitionResult::new(next))
        }

        // Late responses after abort, exit or an engine error are dropped
        (_, VoiceEvent::ResponseReady { .. } | VoiceEvent::TurnEnded { .. }) => {
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Playback completion - the only point where capture resumes
        // ============================================================

        (state, VoiceEvent::PlaybackFinished { playback }) if state.playback() == Some(playback) => {
            Ok(resume_after_playback(next))
        }

        (_, VoiceEvent::PlaybackFinished { playback }) => {
            tracing::debug!(playback = %playback, "Ignoring stale playback completion");
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Errors are never fatal
        // ============================================================

        (state, VoiceEvent::EngineError { error }) => {
            let was_processing = matches!(state, SessionState::Processing);
            next.mic = MicState { muted: true };
            next.state = SessionState::Error {
                error: error.clone(),
            };
            next.last_error = Some(error.clone());
            let mut result = TransitionResult::new(next).with_effects([
                VoiceEffect::StopCapture,
                VoiceEffect::CancelPlayback,
                VoiceEffect::ResetTranscript,
            ]);
            if was_processing {
                result = result.with_effect(VoiceEffect::AbortTurn);
            }
            Ok(result.with_effect(VoiceEffect::ShowNotice { error }))
        }

        (SessionState::Error { .. }, VoiceEvent::ClearError) => {
            next.last_error = None;
            next.state = if session.voice_mode {
                SessionState::Ready
            } else {
                SessionState::Idle
            };
            Ok(TransitionResult::new(next))
        }

        (_, VoiceEvent::ClearError) => {
            next.last_error = None;
            Ok(TransitionResult::new(next))
        }
    }
}

/// Listening again if the mic is unmuted at this moment, otherwise ready
fn resume_after_playback(mut next: VoiceSession) -> TransitionResult {
    if next.mic.muted {
        next.state = SessionState::Ready;
        TransitionResult::new(next)
    } else {
        next.state = SessionState::Listening;
        TransitionResult::new(next).with_effect(VoiceEffect::StartCapture)
    }
}
