//! Voice mode controller
//!
//! Implements the Elm Architecture pattern with pure state transitions: the
//! controller decides, the runtime executes the resulting effects.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{PlaybackKind, VoiceEffect};
pub use event::{InputMode, TurnOutcome, Utterance, VoiceEvent};
pub use state::{MicState, PlaybackId, SessionState, VoiceContext, VoiceSession, DEFAULT_GREETING};
pub use transition::transition;
