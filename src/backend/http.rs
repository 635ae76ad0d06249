//! HTTP implementation of the chat backend

use super::{
    BackendError, ChatBackend, ChatRequest, ChatResponse, EventStream, ImageUpload, Reply,
    SseDecoder, StreamEvent, VisionResponse,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use std::collections::VecDeque;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to the backend's `/chat`, `/chat/stream` and `/vision/analyze` routes
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::network(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, BackendError> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = %status, body = %body, "Backend request failed");
        Err(BackendError::from_status(status, &body))
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::from_reqwest(&e))?;
        serde_json::from_str(&body).map_err(|e| {
            BackendError::decode(format!("Failed to parse response: {e} - body: {body}"))
        })
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn chat(&self, request: ChatRequest) -> Result<Reply, BackendError> {
        tracing::debug!(conversation_id = ?request.conversation_id, "POST /chat");
        let response = self.send(self.client.post(self.url("/chat")).json(&request)).await?;
        let response: ChatResponse = Self::decode(response).await?;
        Ok(response.into())
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream, BackendError> {
        tracing::debug!(conversation_id = ?request.conversation_id, "POST /chat/stream");
        let response = self
            .send(
                self.client
                    .post(self.url("/chat/stream"))
                    .header(reqwest::header::ACCEPT, "text/event-stream")
                    .json(&request),
            )
            .await?;

        let bytes = Box::pin(response.bytes_stream());
        let pending: VecDeque<Result<StreamEvent, BackendError>> = VecDeque::new();
        let state = (bytes, SseDecoder::new(), pending, false);
        let events = futures::stream::unfold(
            state,
            |(mut bytes, mut decoder, mut pending, mut ended)| async move {
                loop {
                    if let Some(event) = pending.pop_front() {
                        return Some((event, (bytes, decoder, pending, ended)));
                    }
                    if ended {
                        return None;
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => pending.extend(decoder.push(&chunk)),
                        Some(Err(e)) => {
                            ended = true;
                            pending.push_back(Err(BackendError::stream(format!(
                                "Stream interrupted: {e}"
                            ))));
                        }
                        None => {
                            ended = true;
                            pending.extend(decoder.finish());
                        }
                    }
                }
            },
        );
        Ok(events.boxed())
    }

    async fn analyze_image(
        &self,
        image: ImageUpload,
        message: Option<String>,
        conversation_id: Option<String>,
    ) -> Result<Reply, BackendError> {
        tracing::debug!(file = %image.file_name, size = image.bytes.len(), "POST /vision/analyze");
        let part = Part::bytes(image.bytes)
            .file_name(image.file_name)
            .mime_str(&image.mime)
            .map_err(|e| BackendError::invalid_input(format!("Invalid MIME type: {e}")))?;

        let mut form = Form::new().part("file", part);
        if let Some(message) = message {
            form = form.text("message", message);
        }
        if let Some(conversation_id) = conversation_id {
            form = form.text("conversation_id", conversation_id);
        }

        let response = self
            .send(self.client.post(self.url("/vision/analyze")).multipart(form))
            .await?;
        let response: VisionResponse = Self::decode(response).await?;
        Ok(response.into())
    }
}
