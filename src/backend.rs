//! Chat backend collaborator
//!
//! The backend owns generation and retrieval; this side only sends the user's
//! message and consumes the reply, streamed or whole.

mod error;
mod http;
mod sse;
mod types;

pub use error::{BackendError, BackendErrorKind};
pub use http::HttpBackend;
pub use sse::SseDecoder;
pub use types::{
    ChatRequest, ChatResponse, ImageUpload, Reply, Source, StreamEvent, VisionResponse,
};

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Events of a streamed reply, in arrival order
pub type EventStream = BoxStream<'static, Result<StreamEvent, BackendError>>;

/// Client for the chat backend
///
/// Cancellation is the caller's concern: dropping a future or stream aborts
/// the underlying request.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a message and wait for the whole reply
    async fn chat(&self, request: ChatRequest) -> Result<Reply, BackendError>;

    /// Send a message and receive the reply as it is generated
    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream, BackendError>;

    /// Upload one image with an optional question
    async fn analyze_image(
        &self,
        image: ImageUpload,
        message: Option<String>,
        conversation_id: Option<String>,
    ) -> Result<Reply, BackendError>;
}

#[async_trait]
impl<T: ChatBackend + ?Sized> ChatBackend for Arc<T> {
    async fn chat(&self, request: ChatRequest) -> Result<Reply, BackendError> {
        (**self).chat(request).await
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream, BackendError> {
        (**self).chat_stream(request).await
    }

    async fn analyze_image(
        &self,
        image: ImageUpload,
        message: Option<String>,
        conversation_id: Option<String>,
    ) -> Result<Reply, BackendError> {
        (**self).analyze_image(image, message, conversation_id).await
    }
}
