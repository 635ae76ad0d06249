//! Conversation orchestrator
//!
//! Owns the transcript, the live turn and the typewriter. Requests run in
//! spawned tasks that report back as `TurnReport`s; everything else happens
//! on the caller's task, so there is exactly one writer.

mod images;
mod turn;

pub use turn::{TurnEvent, TurnId, TurnReport};

use crate::backend::{ChatBackend, ChatRequest, Reply, Source};
use crate::store::{ChatMessage, MessageStore};
use crate::typewriter::{ResponseTypewriter, TickOutcome, TypewriterConfig};
use crate::voice::{InputMode, TurnOutcome, Utterance};
use images::load_image;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use turn::{TurnRequest, TurnTask};

/// Shown when the backend fails before producing any text
pub const FALLBACK_MESSAGE: &str =
    "I'm sorry, I couldn't process your request right now. Please try again.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("A response is already in progress")]
    Busy,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Invalid image {path}: {reason}")]
    InvalidImage { path: String, reason: String },
    #[error("Storage error: {0}")]
    Store(String),
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Use `/chat/stream` instead of `/chat`
    pub streaming: bool,
    /// Fail a stream that stays silent this long
    pub idle_timeout: Option<Duration>,
    /// Continue an existing conversation
    pub conversation_id: Option<String>,
    pub typewriter: TypewriterConfig,
}

/// What the runtime should surface after the orchestrator handled something
#[derive(Debug, Clone, PartialEq)]
pub enum TurnUpdate {
    Status(String),
    Sources(Vec<Source>),
    /// Typewriter frame of the live message
    Render { message_id: String, text: String },
    /// A message joined the transcript
    Appended(ChatMessage),
    /// The response finished rendering and should be spoken
    Responded(ChatMessage),
    /// The turn ended with nothing to speak
    Ended(TurnOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnPhase {
    /// Waiting on the backend
    Requesting,
    /// Backend done, typewriter catching up
    Rendering,
}

#[derive(Debug)]
struct LiveTurn {
    id: TurnId,
    user: ChatMessage,
    message_id: String,
    cancel: CancellationToken,
    received_text: bool,
    sources: Vec<Source>,
    phase: TurnPhase,
}

pub struct Orchestrator {
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn MessageStore>,
    config: OrchestratorConfig,
    reports: mpsc::Sender<TurnReport>,
    typewriter: ResponseTypewriter,
    messages: Vec<ChatMessage>,
    conversation_id: Option<String>,
    /// Key for persistence until the backend assigns a conversation id
    local_conversation: String,
    turn: Option<LiveTurn>,
    next_turn: TurnId,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn MessageStore>,
        config: OrchestratorConfig,
        reports: mpsc::Sender<TurnReport>,
    ) -> Self {
        Self {
            backend,
            store,
            typewriter: ResponseTypewriter::new(config.typewriter),
            conversation_id: config.conversation_id.clone(),
            config,
            reports,
            messages: Vec::new(),
            local_conversation: uuid::Uuid::new_v4().to_string(),
            turn: None,
            next_turn: 1,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.turn.is_some()
    }

    /// Whether the typewriter timer needs to run
    pub fn is_rendering(&self) -> bool {
        self.typewriter.is_active()
    }

    pub fn tick_interval(&self) -> Duration {
        self.typewriter.config().tick
    }

    /// Load the configured conversation's history into the transcript
    pub async fn load_history(&mut self) -> Result<usize, OrchestratorError> {
        let Some(conversation_id) = self.conversation_id.clone() else {
            return Ok(0);
        };
        let history = self
            .store
            .load_messages(&conversation_id)
            .await
            .map_err(OrchestratorError::Store)?;
        tracing::info!(conversation_id = %conversation_id, count = history.len(), "Loaded conversation history");
        let count = history.len();
        self.messages = history;
        Ok(count)
    }

    /// Start a turn for a typed or spoken message
    pub fn submit(&mut self, utterance: &Utterance) -> Result<ChatMessage, OrchestratorError> {
        let text = utterance.text.trim();
        if text.is_empty() {
            return Err(OrchestratorError::EmptyMessage);
        }
        let request = TurnRequest::Chat {
            request: ChatRequest {
                message: text.to_string(),
                conversation_id: self.conversation_id.clone(),
            },
            streaming: self.config.streaming,
        };
        self.start_turn(ChatMessage::user(text, utterance.mode), request)
    }

    /// Start a turn that uploads images with an optional question
    pub async fn submit_images(
        &mut self,
        paths: &[PathBuf],
        message: Option<String>,
        mode: InputMode,
    ) -> Result<ChatMessage, OrchestratorError> {
        if self.is_busy() {
            return Err(OrchestratorError::Busy);
        }
        if paths.is_empty() {
            return Err(OrchestratorError::EmptyMessage);
        }

        let mut uploads = Vec::with_capacity(paths.len());
        for path in paths {
            uploads.push(load_image(path).await?);
        }

        let message = message.filter(|m| !m.trim().is_empty());
        let names: Vec<&str> = uploads.iter().map(|u| u.file_name.as_str()).collect();
        let content = match &message {
            Some(text) => format!("{text}\n[images: {}]", names.join(", ")),
            None => format!("[images: {}]", names.join(", ")),
        };

        let request = TurnRequest::Images {
            images: uploads,
            message,
            conversation_id: self.conversation_id.clone(),
        };
        self.start_turn(ChatMessage::user(content, mode), request)
    }

    fn start_turn(
        &mut self,
        user: ChatMessage,
        request: TurnRequest,
    ) -> Result<ChatMessage, OrchestratorError> {
        if self.is_busy() {
            return Err(OrchestratorError::Busy);
        }

        let id = self.next_turn;
        self.next_turn += 1;
        let message_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();

        tracing::info!(turn = id, message_id = %message_id, "Starting turn");
        self.typewriter.begin(message_id.clone());
        self.messages.push(user.clone());
        self.turn = Some(LiveTurn {
            id,
            user: user.clone(),
            message_id,
            cancel: cancel.clone(),
            received_text: false,
            sources: Vec::new(),
            phase: TurnPhase::Requesting,
        });

        TurnTask {
            turn: id,
            backend: self.backend.clone(),
            request,
            idle_timeout: self.config.idle_timeout,
            cancel,
            reports: self.reports.clone(),
        }
        .spawn();

        Ok(user)
    }

    /// Apply progress reported by a request task
    pub async fn handle_report(&mut self, report: TurnReport) -> Vec<TurnUpdate> {
        let Some(turn) = self.turn.as_mut() else {
            tracing::debug!(turn = report.turn, "Ignoring report with no live turn");
            return vec![];
        };
        if turn.id != report.turn || turn.phase != TurnPhase::Requesting {
            tracing::debug!(turn = report.turn, live = turn.id, "Ignoring stale turn report");
            return vec![];
        }

        match report.event {
            TurnEvent::ConversationId(id) => {
                self.conversation_id = Some(id);
                vec![]
            }
            TurnEvent::Status(status) => vec![TurnUpdate::Status(status)],
            TurnEvent::Chunk(chunk) => {
                if !chunk.is_empty() {
                    turn.received_text = true;
                    self.typewriter.push_chunk(&chunk);
                }
                vec![]
            }
            TurnEvent::Sources(sources) => {
                turn.sources.clone_from(&sources);
                vec![TurnUpdate::Sources(sources)]
            }
            TurnEvent::Reply(reply) => self.accept_reply(reply).await,
            TurnEvent::Completed => {
                if turn.received_text {
                    turn.phase = TurnPhase::Rendering;
                    self.typewriter.complete();
                    vec![]
                } else {
                    self.fail("Backend returned an empty response").await
                }
            }
            TurnEvent::Failed(error) => self.fail(&error.message).await,
        }
    }

    async fn accept_reply(&mut self, reply: Reply) -> Vec<TurnUpdate> {
        if reply.text.trim().is_empty() {
            return self.fail("Backend returned an empty response").await;
        }
        if let Some(id) = reply.conversation_id {
            self.conversation_id = Some(id);
        }
        let mut updates = vec![];
        if let Some(turn) = self.turn.as_mut() {
            turn.received_text = true;
            turn.phase = TurnPhase::Rendering;
            if !reply.sources.is_empty() {
                turn.sources.clone_from(&reply.sources);
                updates.push(TurnUpdate::Sources(reply.sources));
            }
        }
        // Whole replies are animated like streamed ones
        self.typewriter.set_target(&reply.text);
        self.typewriter.complete();
        updates
    }

    /// Keep partial text if any arrived, otherwise fall back to a fixed message
    async fn fail(&mut self, reason: &str) -> Vec<TurnUpdate> {
        let Some(turn) = self.turn.as_mut() else {
            return vec![];
        };
        tracing::warn!(turn = turn.id, reason, received_text = turn.received_text, "Turn failed");

        if turn.received_text {
            turn.phase = TurnPhase::Rendering;
            self.typewriter.complete();
            return vec![];
        }

        self.typewriter.discard();
        let Some(turn) = self.turn.take() else {
            return vec![];
        };
        let fallback =
            ChatMessage::assistant(uuid::Uuid::new_v4().to_string(), FALLBACK_MESSAGE, vec![]);
        self.finish_turn(&turn.user, &fallback).await;
        vec![
            TurnUpdate::Appended(fallback),
            TurnUpdate::Ended(TurnOutcome::Failed),
        ]
    }

    /// Advance the typewriter by one tick
    pub async fn tick(&mut self) -> Vec<TurnUpdate> {
        let (outcome, finished) = self.typewriter.tick(1);
        match outcome {
            TickOutcome::Idle => vec![],
            TickOutcome::Rendered { .. } => self
                .typewriter
                .current()
                .map(|m| TurnUpdate::Render {
                    message_id: m.id().to_string(),
                    text: m.rendered_text().to_string(),
                })
                .into_iter()
                .collect(),
            TickOutcome::Finished => {
                let (Some(message), Some(turn)) = (finished, self.turn.take()) else {
                    return vec![];
                };
                let reply = ChatMessage::assistant(
                    message.id(),
                    message.rendered_text(),
                    turn.sources.clone(),
                );
                tracing::info!(turn = turn.id, chars = reply.content.chars().count(), "Response rendered");
                self.finish_turn(&turn.user, &reply).await;
                vec![TurnUpdate::Responded(reply)]
            }
        }
    }

    /// Cancel the live turn, keeping whatever text already arrived
    ///
    /// Safe to call repeatedly and after the turn has ended.
    pub async fn abort(&mut self) -> Vec<TurnUpdate> {
        let Some(turn) = self.turn.take() else {
            return vec![];
        };
        turn.cancel.cancel();
        tracing::info!(turn = turn.id, "Turn aborted");

        let partial = self
            .typewriter
            .discard()
            .map(|m| m.target_text().to_string())
            .filter(|text| !text.trim().is_empty());

        let mut updates = vec![];
        match partial {
            Some(text) => {
                let message = ChatMessage::assistant(turn.message_id.clone(), text, turn.sources.clone());
                self.finish_turn(&turn.user, &message).await;
                updates.push(TurnUpdate::Appended(message));
            }
            None => self.persist(&[&turn.user]).await,
        }
        updates.push(TurnUpdate::Ended(TurnOutcome::Aborted));
        updates
    }

    /// Abort anything in flight and start a new conversation
    pub async fn clear(&mut self) -> Vec<TurnUpdate> {
        let updates = self.abort().await;
        self.messages.clear();
        self.conversation_id = None;
        self.local_conversation = uuid::Uuid::new_v4().to_string();
        updates
    }

    async fn finish_turn(&mut self, user: &ChatMessage, reply: &ChatMessage) {
        self.messages.push(reply.clone());
        self.persist(&[user, reply]).await;
    }

    /// Storage failures never break the conversation
    async fn persist(&self, messages: &[&ChatMessage]) {
        let key = self
            .conversation_id
            .as_deref()
            .unwrap_or(&self.local_conversation);
        for message in messages {
            if let Err(e) = self.store.add_message(key, message).await {
                tracing::warn!(conversation_id = %key, error = %e, "Failed to persist message");
            }
        }
    }
}
