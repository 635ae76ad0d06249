//! Engine for platforms without capture or playback

use super::{Capabilities, CaptureEvent, SpeechEngine, SpeechError};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Reports every operation as `not_supported`; text chat keeps working
pub struct UnsupportedSpeechEngine {
    events: broadcast::Sender<CaptureEvent>,
}

impl UnsupportedSpeechEngine {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1);
        Self { events }
    }
}

impl Default for UnsupportedSpeechEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechEngine for UnsupportedSpeechEngine {
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    async fn start_capture(&self) -> Result<(), SpeechError> {
        Err(SpeechError::not_supported("Speech capture is not available on this platform"))
    }

    fn stop_capture(&self) {}

    async fn speak(&self, _text: &str) -> Result<(), SpeechError> {
        Err(SpeechError::not_supported("Speech playback is not available on this platform"))
    }

    fn cancel_playback(&self) {}

    fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }
}
