//! Backend exchange for a single turn, run as a spawned task

use crate::backend::{
    BackendError, ChatBackend, ChatRequest, EventStream, ImageUpload, Reply, Source, StreamEvent,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub type TurnId = u64;

/// Progress of a turn as seen by the request task
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    ConversationId(String),
    Status(String),
    Chunk(String),
    Sources(Vec<Source>),
    /// Whole reply of a non-streamed request
    Reply(Reply),
    /// Stream finished normally
    Completed,
    Failed(BackendError),
}

/// A `TurnEvent` tagged with the turn it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub turn: TurnId,
    pub event: TurnEvent,
}

#[derive(Debug, Clone)]
pub(super) enum TurnRequest {
    Chat {
        request: ChatRequest,
        streaming: bool,
    },
    Images {
        images: Vec<ImageUpload>,
        message: Option<String>,
        conversation_id: Option<String>,
    },
}

pub(super) struct TurnTask {
    pub turn: TurnId,
    pub backend: Arc<dyn ChatBackend>,
    pub request: TurnRequest,
    pub idle_timeout: Option<Duration>,
    pub cancel: CancellationToken,
    pub reports: mpsc::Sender<TurnReport>,
}

impl TurnTask {
    pub(super) fn spawn(self) {
        tokio::spawn(self.run());
    }

    async fn run(self) {
        let turn = self.turn;
        let cancel = self.cancel.clone();

        // Race the exchange against cancellation; every await inside is a
        // chunk boundary
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                tracing::info!(turn, "Turn cancelled");
            }

            result = self.exchange() => {
                let event = result.unwrap_or_else(|e| {
                    tracing::warn!(turn, error = %e, kind = ?e.kind, "Turn failed");
                    TurnEvent::Failed(e)
                });
                self.report(event).await;
            }
        }
    }

    async fn report(&self, event: TurnEvent) {
        let report = TurnReport {
            turn: self.turn,
            event,
        };
        if self.reports.send(report).await.is_err() {
            tracing::debug!(turn = self.turn, "Runtime gone, dropping turn event");
        }
    }

    /// Run the request; intermediate progress is reported directly, the
    /// terminal event is returned
    async fn exchange(&self) -> Result<TurnEvent, BackendError> {
        match &self.request {
            TurnRequest::Chat {
                request,
                streaming: false,
            } => Ok(TurnEvent::Reply(self.backend.chat(request.clone()).await?)),
            TurnRequest::Chat {
                request,
                streaming: true,
            } => {
                let events = self.backend.chat_stream(request.clone()).await?;
                self.consume(events).await
            }
            TurnRequest::Images {
                images,
                message,
                conversation_id,
            } => self.analyze(images, message.as_ref(), conversation_id.clone()).await,
        }
    }

    async fn consume(&self, mut events: EventStream) -> Result<TurnEvent, BackendError> {
        loop {
            let next = match self.idle_timeout {
                Some(limit) => tokio::time::timeout(limit, events.next())
                    .await
                    .map_err(|_| {
                        BackendError::stream(format!(
                            "No data received for {}s",
                            limit.as_secs()
                        ))
                    })?,
                None => events.next().await,
            };

            // A stream that ends without `done` still delivered everything it had
            let Some(event) = next else {
                return Ok(TurnEvent::Completed);
            };

            match event? {
                StreamEvent::ConversationId(id) => self.report(TurnEvent::ConversationId(id)).await,
                StreamEvent::Status(status) => self.report(TurnEvent::Status(status)).await,
                StreamEvent::Chunk(chunk) => self.report(TurnEvent::Chunk(chunk)).await,
                StreamEvent::Sources(sources) => self.report(TurnEvent::Sources(sources)).await,
                StreamEvent::Done(_) => return Ok(TurnEvent::Completed),
                StreamEvent::Error(message) => return Err(BackendError::stream(message)),
            }
        }
    }

    /// One upload per image, chained through the conversation id
    async fn analyze(
        &self,
        images: &[ImageUpload],
        message: Option<&String>,
        mut conversation_id: Option<String>,
    ) -> Result<TurnEvent, BackendError> {
        let mut answers = Vec::with_capacity(images.len());
        let mut sources = Vec::new();

        for image in images {
            let reply = self
                .backend
                .analyze_image(image.clone(), message.cloned(), conversation_id.clone())
                .await?;
            if reply.conversation_id.is_some() {
                conversation_id = reply.conversation_id;
            }
            answers.push(reply.text);
            sources.extend(reply.sources);
        }

        Ok(TurnEvent::Reply(Reply {
            conversation_id,
            text: answers.join("\n\n"),
            sources,
        }))
    }
}
