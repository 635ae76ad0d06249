//! Mock implementations for testing
//!
//! These mocks enable deterministic testing of the runtime without audio
//! devices or a backend.

use crate::backend::{
    BackendError, ChatBackend, ChatRequest, EventStream, ImageUpload, Reply, StreamEvent,
};
use crate::speech::{Capabilities, CaptureEvent, SpeechEngine, SpeechError};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock Speech Engine
// ============================================================================

/// Calls made on the engine, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    StartCapture,
    StopCapture,
    Speak(String),
    CancelPlayback,
}

/// Speech engine that plays for a fixed duration and records every call
pub struct MockSpeechEngine {
    capabilities: Capabilities,
    playback_duration: Duration,
    events: broadcast::Sender<CaptureEvent>,
    capturing: Mutex<bool>,
    playback: Mutex<Option<(u64, CancellationToken)>>,
    next_playback: AtomicU64,
    capture_errors: Mutex<VecDeque<SpeechError>>,
    speak_errors: Mutex<VecDeque<SpeechError>>,
    /// Times playback began while capture was running
    pub overlaps: Mutex<usize>,
    pub calls: Mutex<Vec<EngineCall>>,
}

impl MockSpeechEngine {
    pub fn new(playback_duration: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            capabilities: Capabilities {
                capture: true,
                playback: true,
            },
            playback_duration,
            events,
            capturing: Mutex::new(false),
            playback: Mutex::new(None),
            next_playback: AtomicU64::new(1),
            capture_errors: Mutex::new(VecDeque::new()),
            speak_errors: Mutex::new(VecDeque::new()),
            overlaps: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        let mut engine = Self::new(Duration::ZERO);
        engine.capabilities = Capabilities::default();
        engine
    }

    /// The next `start_capture` fails with `error`
    pub fn fail_next_capture(&self, error: SpeechError) {
        self.capture_errors.lock().unwrap().push_back(error);
    }

    /// The next `speak` fails with `error`
    pub fn fail_next_speak(&self, error: SpeechError) {
        self.speak_errors.lock().unwrap().push_back(error);
    }

    /// Simulate the recognizer hearing more speech
    pub fn hear(&self, transcript: &str) {
        let _ = self.events.send(CaptureEvent::Transcript {
            text: transcript.to_string(),
        });
    }

    /// Simulate the recognizer dying mid-capture
    pub fn fail_capture(&self, error: SpeechError) {
        *self.capturing.lock().unwrap() = false;
        let _ = self.events.send(CaptureEvent::Failed { error });
    }

    /// Simulate the recognizer exiting cleanly on its own
    pub fn end_capture(&self) {
        *self.capturing.lock().unwrap() = false;
        let _ = self.events.send(CaptureEvent::Ended);
    }

    pub fn is_capturing(&self) -> bool {
        *self.capturing.lock().unwrap()
    }

    pub fn recorded_calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.recorded_calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::Speak(text) => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SpeechEngine for MockSpeechEngine {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn start_capture(&self) -> Result<(), SpeechError> {
        self.calls.lock().unwrap().push(EngineCall::StartCapture);
        if let Some(error) = self.capture_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        if self.playback.lock().unwrap().is_some() {
            *self.overlaps.lock().unwrap() += 1;
        }
        *self.capturing.lock().unwrap() = true;
        Ok(())
    }

    fn stop_capture(&self) {
        self.calls.lock().unwrap().push(EngineCall::StopCapture);
        *self.capturing.lock().unwrap() = false;
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        self.calls.lock().unwrap().push(EngineCall::Speak(text.to_string()));
        if self.is_capturing() {
            *self.overlaps.lock().unwrap() += 1;
        }
        if let Some(error) = self.speak_errors.lock().unwrap().pop_front() {
            return Err(error);
        }

        let id = self.next_playback.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let previous = self.playback.lock().unwrap().replace((id, cancel.clone()));
        if let Some((_, previous)) = previous {
            previous.cancel();
        }
        tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(self.playback_duration) => {}
        }

        let mut slot = self.playback.lock().unwrap();
        if slot.as_ref().is_some_and(|(current, _)| *current == id) {
            *slot = None;
        }
        Ok(())
    }

    fn cancel_playback(&self) {
        self.calls.lock().unwrap().push(EngineCall::CancelPlayback);
        let current = self.playback.lock().unwrap().take();
        if let Some((_, current)) = current {
            current.cancel();
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// Mock Backend
// ============================================================================

#[derive(Debug, Clone)]
enum MockResponse {
    Reply(String),
    Stream(Vec<Result<StreamEvent, BackendError>>),
    Error(BackendError),
}

/// Backend with queued responses, shared by every endpoint
pub struct MockBackend {
    responses: Mutex<VecDeque<MockResponse>>,
    /// Messages sent, in order
    pub requests: Mutex<Vec<String>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a whole reply; streamed as one chunk when requested as a stream
    pub fn queue_reply(&self, text: impl Into<String>) {
        self.push(MockResponse::Reply(text.into()));
    }

    pub fn queue_stream(&self, events: Vec<Result<StreamEvent, BackendError>>) {
        self.push(MockResponse::Stream(events));
    }

    pub fn queue_error(&self, error: BackendError) {
        self.push(MockResponse::Error(error));
    }

    pub fn recorded_requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn push(&self, response: MockResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    fn next(&self, message: &str) -> MockResponse {
        self.requests.lock().unwrap().push(message.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockResponse::Error(BackendError::network("No mock response queued")))
    }

    fn into_reply(response: MockResponse) -> Result<Reply, BackendError> {
        match response {
            MockResponse::Reply(text) => Ok(Reply {
                conversation_id: Some("conv-test".to_string()),
                text,
                sources: vec![],
            }),
            MockResponse::Stream(events) => {
                let mut text = String::new();
                for event in events {
                    match event? {
                        StreamEvent::Chunk(chunk) => text.push_str(&chunk),
                        StreamEvent::Error(message) => return Err(BackendError::stream(message)),
                        _ => {}
                    }
                }
                Ok(Reply {
                    conversation_id: Some("conv-test".to_string()),
                    text,
                    sources: vec![],
                })
            }
            MockResponse::Error(error) => Err(error),
        }
    }

    fn into_stream(response: MockResponse) -> Result<Vec<Result<StreamEvent, BackendError>>, BackendError> {
        match response {
            MockResponse::Reply(text) => Ok(vec![
                Ok(StreamEvent::ConversationId("conv-test".to_string())),
                Ok(StreamEvent::Chunk(text)),
                Ok(StreamEvent::Done(true)),
            ]),
            MockResponse::Stream(events) => Ok(events),
            MockResponse::Error(error) => Err(error),
        }
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn chat(&self, request: ChatRequest) -> Result<Reply, BackendError> {
        Self::into_reply(self.next(&request.message))
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream, BackendError> {
        let events = Self::into_stream(self.next(&request.message))?;
        Ok(futures::stream::iter(events).boxed())
    }

    async fn analyze_image(
        &self,
        image: ImageUpload,
        message: Option<String>,
        _conversation_id: Option<String>,
    ) -> Result<Reply, BackendError> {
        let label = message.unwrap_or(image.file_name);
        Self::into_reply(self.next(&label))
    }
}

// ============================================================================
// Delayed Mock Backend (for cancellation testing)
// ============================================================================

/// Backend that waits before answering and between streamed events
pub struct DelayedMockBackend {
    inner: MockBackend,
    delay: Duration,
    /// Notified when a request starts (for test synchronization)
    pub request_started: Arc<Notify>,
}

impl DelayedMockBackend {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MockBackend::new(),
            delay,
            request_started: Arc::new(Notify::new()),
        }
    }

    pub fn queue_reply(&self, text: impl Into<String>) {
        self.inner.queue_reply(text);
    }

    pub fn queue_stream(&self, events: Vec<Result<StreamEvent, BackendError>>) {
        self.inner.queue_stream(events);
    }
}

#[async_trait]
impl ChatBackend for DelayedMockBackend {
    async fn chat(&self, request: ChatRequest) -> Result<Reply, BackendError> {
        let response = self.inner.next(&request.message);
        self.request_started.notify_waiters();
        tokio::time::sleep(self.delay).await;
        MockBackend::into_reply(response)
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream, BackendError> {
        let events = MockBackend::into_stream(self.inner.next(&request.message))?;
        self.request_started.notify_waiters();
        let delay = self.delay;
        Ok(futures::stream::iter(events)
            .then(move |event| async move {
                tokio::time::sleep(delay).await;
                event
            })
            .boxed())
    }

    async fn analyze_image(
        &self,
        image: ImageUpload,
        message: Option<String>,
        conversation_id: Option<String>,
    ) -> Result<Reply, BackendError> {
        self.request_started.notify_waiters();
        tokio::time::sleep(self.delay).await;
        self.inner.analyze_image(image, message, conversation_id).await
    }
}
