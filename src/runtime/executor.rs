//! Voice session runtime executor

use super::{ClientEvent, Command, RuntimeHandle};
use crate::backend::ChatBackend;
use crate::debounce::SilenceDebouncer;
use crate::orchestrator::{Orchestrator, OrchestratorConfig, TurnReport, TurnUpdate};
use crate::speech::{CaptureEvent, SpeechEngine, SpeechError};
use crate::store::MessageStore;
use crate::voice::{
    transition, InputMode, PlaybackId, PlaybackKind, SessionState, TurnOutcome, Utterance,
    VoiceContext, VoiceEffect, VoiceEvent, VoiceSession,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub greeting: String,
    pub silence_window: Duration,
    pub orchestrator: OrchestratorConfig,
}

/// Results of spawned playback tasks
#[derive(Debug)]
enum Internal {
    PlaybackFinished(PlaybackId),
    PlaybackFailed(PlaybackId, SpeechError),
}

/// Generic voice runtime that can work with any speech engine
pub struct VoiceRuntime<E>
where
    E: SpeechEngine + 'static,
{
    context: VoiceContext,
    session: VoiceSession,
    engine: Arc<E>,
    orchestrator: Orchestrator,
    debouncer: SilenceDebouncer,
    commands: mpsc::Receiver<Command>,
    internal_rx: mpsc::Receiver<Internal>,
    internal_tx: mpsc::Sender<Internal>,
    turn_rx: mpsc::Receiver<TurnReport>,
    capture_rx: broadcast::Receiver<CaptureEvent>,
    broadcast_tx: broadcast::Sender<ClientEvent>,
    /// Controller events raised while executing effects, applied in order
    pending: VecDeque<VoiceEvent>,
    /// Images waiting for the controller to dispatch their turn
    pending_images: Option<(Vec<PathBuf>, Option<String>)>,
}

impl<E> VoiceRuntime<E>
where
    E: SpeechEngine + 'static,
{
    pub fn new(
        engine: E,
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn MessageStore>,
        config: RuntimeConfig,
    ) -> (Self, RuntimeHandle) {
        let (command_tx, commands) = mpsc::channel(32);
        let (internal_tx, internal_rx) = mpsc::channel(32);
        let (turn_tx, turn_rx) = mpsc::channel(256);
        let (broadcast_tx, _) = broadcast::channel(256);

        let engine = Arc::new(engine);
        let context = VoiceContext::new(config.greeting, engine.capabilities().voice_available());
        let capture_rx = engine.subscribe();

        let runtime = Self {
            context,
            session: VoiceSession::new(),
            engine,
            orchestrator: Orchestrator::new(backend, store, config.orchestrator, turn_tx),
            debouncer: SilenceDebouncer::new(config.silence_window),
            commands,
            internal_rx,
            internal_tx,
            turn_rx,
            capture_rx,
            broadcast_tx: broadcast_tx.clone(),
            pending: VecDeque::new(),
            pending_images: None,
        };
        let handle = RuntimeHandle {
            commands: command_tx,
            events: broadcast_tx,
        };
        (runtime, handle)
    }

    pub async fn run(mut self) {
        tracing::info!(
            voice_available = self.context.voice_available,
            "Starting voice runtime"
        );

        match self.orchestrator.load_history().await {
            Ok(_) => {
                for message in self.orchestrator.messages().to_vec() {
                    self.emit(ClientEvent::MessageAppended { message });
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load conversation history");
                self.emit(ClientEvent::Notice {
                    message: e.to_string(),
                });
            }
        }
        self.emit_state();

        let mut ticker = tokio::time::interval(self.orchestrator.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut capture_open = true;

        loop {
            let deadline = self.debouncer.deadline();
            let rendering = self.orchestrator.is_rendering();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },

                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal).await,

                Some(report) = self.turn_rx.recv() => {
                    let updates = self.orchestrator.handle_report(report).await;
                    self.apply_updates(updates);
                    self.drain().await;
                }

                capture = self.capture_rx.recv(), if capture_open => match capture {
                    Ok(event) => self.handle_capture(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Capture events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => capture_open = false,
                },

                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(utterance) = self.debouncer.poll(Instant::now()) {
                        tracing::info!(chars = utterance.text.chars().count(), "Utterance finalized after silence");
                        self.dispatch(VoiceEvent::Submitted { utterance }).await;
                    }
                }

                _ = ticker.tick(), if rendering => {
                    let updates = self.orchestrator.tick().await;
                    self.apply_updates(updates);
                    self.drain().await;
                }
            }
        }

        self.engine.stop_capture();
        if self.session.state.is_playing() {
            self.engine.cancel_playback();
        }
        let _ = self.orchestrator.abort().await;
        tracing::info!("Voice runtime stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        tracing::debug!(?command, "Handling command");
        match command {
            Command::EnterVoiceMode => self.dispatch(VoiceEvent::EnterVoiceMode).await,
            Command::ExitVoiceMode => self.dispatch(VoiceEvent::ExitVoiceMode).await,
            Command::Unmute => self.dispatch(VoiceEvent::Unmute).await,
            Command::Mute => self.stop_listening().await,
            Command::Abort => {
                let updates = self.orchestrator.abort().await;
                self.apply_updates(updates);
                self.drain().await;
            }
            Command::ClearError => self.dispatch(VoiceEvent::ClearError).await,
            Command::ClearConversation => {
                let updates = self.orchestrator.clear().await;
                self.apply_updates(updates);
                self.emit(ClientEvent::ConversationCleared);
                self.drain().await;
            }
            Command::SendText(text) => {
                let utterance = Utterance::new(text, InputMode::Text);
                self.dispatch(VoiceEvent::Submitted { utterance }).await;
            }
            Command::SendImages { paths, message } => {
                let text = message.clone().unwrap_or_else(|| describe_images(&paths));
                self.pending_images = Some((paths, message));
                let utterance = Utterance::new(text, InputMode::Text);
                self.dispatch(VoiceEvent::Submitted { utterance }).await;
                // Rejected submissions leave the images behind
                self.pending_images = None;
            }
            Command::Shutdown => {}
        }
    }

    async fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::PlaybackFinished(playback) => {
                self.dispatch(VoiceEvent::PlaybackFinished { playback }).await;
            }
            Internal::PlaybackFailed(playback, error) => {
                if self.session.state.playback() == Some(playback) {
                    self.dispatch(VoiceEvent::EngineError { error }).await;
                } else {
                    tracing::debug!(playback = %playback, error = %error, "Ignoring failure of stale playback");
                }
            }
        }
    }

    async fn handle_capture(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Transcript { text } => {
                if !self.session.state.is_capturing() {
                    tracing::debug!("Ignoring transcript outside of listening");
                    return;
                }
                if self.debouncer.observe(&text, Instant::now()) {
                    self.emit(ClientEvent::TranscriptUpdated { text });
                }
            }
            CaptureEvent::Failed { error } => {
                tracing::warn!(error = %error, "Capture failed");
                self.dispatch(VoiceEvent::EngineError { error }).await;
            }
            CaptureEvent::Ended => {
                if self.session.state.is_capturing() {
                    self.stop_listening().await;
                }
            }
        }
    }

    /// Mute the mic. Mid-sentence this sends what was said so far, so
    /// listening moves to processing rather than ready.
    async fn stop_listening(&mut self) {
        let utterance = if self.session.state.is_capturing() {
            self.debouncer.flush()
        } else {
            None
        };
        match utterance {
            Some(utterance) => self.dispatch(VoiceEvent::Submitted { utterance }).await,
            None => self.dispatch(VoiceEvent::Mute).await,
        }
    }

    async fn dispatch(&mut self, event: VoiceEvent) {
        self.pending.push_back(event);
        self.drain().await;
    }

    /// Apply queued controller events, including any their effects raise
    async fn drain(&mut self) {
        while let Some(event) = self.pending.pop_front() {
            let before = self.snapshot();
            match transition(&self.session, &self.context, event) {
                Ok(result) => {
                    self.session = result.session;
                    debug_assert!(self.session.is_consistent(), "{:?}", self.session);
                    if self.snapshot() != before {
                        tracing::info!(
                            from = %before.0,
                            to = %self.session.state,
                            muted = self.session.mic.muted,
                            "Voice state transition"
                        );
                        self.emit_state();
                    }
                    for effect in result.effects {
                        self.execute_effect(effect).await;
                    }
                }
                Err(e) => {
                    tracing::info!(state = %self.session.state, error = %e, "Rejected voice event");
                    self.emit(ClientEvent::Rejected {
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    async fn execute_effect(&mut self, effect: VoiceEffect) {
        match effect {
            VoiceEffect::StartCapture => {
                self.debouncer.reset();
                if let Err(error) = self.engine.start_capture().await {
                    tracing::warn!(error = %error, "Failed to start capture");
                    self.pending.push_back(VoiceEvent::EngineError { error });
                }
            }
            VoiceEffect::StopCapture => self.engine.stop_capture(),
            VoiceEffect::ResetTranscript => {
                if !self.debouncer.transcript().is_empty() {
                    self.debouncer.reset();
                    self.emit(ClientEvent::TranscriptUpdated {
                        text: String::new(),
                    });
                }
            }
            VoiceEffect::Speak {
                playback,
                text,
                kind,
            } => self.spawn_playback(playback, text, kind),
            VoiceEffect::CancelPlayback => self.engine.cancel_playback(),
            VoiceEffect::Dispatch { utterance } => self.start_turn(&utterance).await,
            VoiceEffect::AbortTurn => {
                let updates = self.orchestrator.abort().await;
                self.apply_updates(updates);
            }
            VoiceEffect::ShowNotice { error } => self.emit(ClientEvent::Notice {
                message: error.to_string(),
            }),
        }
    }

    fn spawn_playback(&self, playback: PlaybackId, text: String, kind: PlaybackKind) {
        let engine = self.engine.clone();
        let internal_tx = self.internal_tx.clone();
        tracing::debug!(playback = %playback, ?kind, chars = text.chars().count(), "Starting playback");

        tokio::spawn(async move {
            let result = match engine.speak(&text).await {
                Ok(()) => Internal::PlaybackFinished(playback),
                Err(error) => {
                    tracing::warn!(playback = %playback, error = %error, "Playback failed");
                    Internal::PlaybackFailed(playback, error)
                }
            };
            let _ = internal_tx.send(result).await;
        });
    }

    async fn start_turn(&mut self, utterance: &Utterance) {
        tracing::debug!(
            requested_at = %utterance.requested_at,
            mode = ?utterance.mode,
            images = self.pending_images.is_some(),
            "Dispatching utterance"
        );
        let submitted = match self.pending_images.take() {
            Some((paths, message)) => {
                self.orchestrator
                    .submit_images(&paths, message, utterance.mode)
                    .await
            }
            None => self.orchestrator.submit(utterance),
        };

        match submitted {
            Ok(message) => self.emit(ClientEvent::MessageAppended { message }),
            Err(e) => {
                tracing::warn!(error = %e, "Could not start turn");
                self.emit(ClientEvent::Notice {
                    message: e.to_string(),
                });
                self.pending.push_back(VoiceEvent::TurnEnded {
                    outcome: TurnOutcome::Failed,
                });
            }
        }
    }

    /// Surface orchestrator output; controller events are queued for `drain`
    fn apply_updates(&mut self, updates: Vec<TurnUpdate>) {
        for update in updates {
            match update {
                TurnUpdate::Status(status) => self.emit(ClientEvent::Status { status }),
                TurnUpdate::Sources(sources) => self.emit(ClientEvent::Sources { sources }),
                TurnUpdate::Render { message_id, text } => {
                    self.emit(ClientEvent::Render { message_id, text });
                }
                TurnUpdate::Appended(message) => {
                    self.emit(ClientEvent::MessageAppended { message });
                }
                TurnUpdate::Responded(message) => {
                    tracing::debug!(
                        conversation_id = ?self.orchestrator.conversation_id(),
                        message_id = %message.id,
                        "Response ready"
                    );
                    self.pending.push_back(VoiceEvent::ResponseReady {
                        text: message.content.clone(),
                    });
                    self.emit(ClientEvent::MessageAppended { message });
                }
                TurnUpdate::Ended(outcome) => {
                    self.pending.push_back(VoiceEvent::TurnEnded { outcome });
                }
            }
        }
    }

    fn snapshot(&self) -> (SessionState, bool, bool) {
        (
            self.session.state.clone(),
            self.session.mic.muted,
            self.session.voice_mode,
        )
    }

    fn emit_state(&self) {
        self.emit(ClientEvent::StateChanged {
            state: self.session.state.clone(),
            muted: self.session.mic.muted,
            voice_mode: self.session.voice_mode,
        });
    }

    fn emit(&self, event: ClientEvent) {
        // No subscribers is fine
        let _ = self.broadcast_tx.send(event);
    }
}

fn describe_images(paths: &[PathBuf]) -> String {
    let names: Vec<String> = paths
        .iter()
        .map(|p| {
            p.file_name()
                .map_or_else(|| p.display().to_string(), |n| n.to_string_lossy().into_owned())
        })
        .collect();
    format!("[images: {}]", names.join(", "))
}
