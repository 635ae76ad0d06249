//! Runtime for the voice session
//!
//! One task owns the controller, the orchestrator and the debouncer. Front
//! ends talk to it through a `RuntimeHandle`.

mod executor;

#[cfg(test)]
pub mod testing;

pub use executor::{RuntimeConfig, VoiceRuntime};

use crate::backend::Source;
use crate::store::ChatMessage;
use crate::voice::SessionState;
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc};

/// Requests from the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    EnterVoiceMode,
    ExitVoiceMode,
    Mute,
    Unmute,
    /// Cancel the in-flight request
    Abort,
    ClearError,
    /// Start a new conversation
    ClearConversation,
    SendText(String),
    SendImages {
        paths: Vec<PathBuf>,
        message: Option<String>,
    },
    Shutdown,
}

/// Events sent to front ends
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    StateChanged {
        state: SessionState,
        muted: bool,
        voice_mode: bool,
    },
    /// Live caption of the capture in progress
    TranscriptUpdated { text: String },
    /// Typewriter frame of the response being rendered
    Render { message_id: String, text: String },
    MessageAppended { message: ChatMessage },
    Status { status: String },
    Sources { sources: Vec<Source> },
    /// Dismissible error notice
    Notice { message: String },
    /// A command could not be carried out right now
    Rejected { reason: String },
    ConversationCleared,
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct RuntimeHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<ClientEvent>,
}

impl RuntimeHandle {
    /// Returns `false` once the runtime has stopped
    pub async fn send(&self, command: Command) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}
