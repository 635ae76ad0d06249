//! Incremental decoder for `text/event-stream` bodies

use super::{BackendError, StreamEvent};

/// Splits arbitrary byte chunks into `data:` payloads
///
/// Network chunks may split lines and multi-byte characters, so bytes are
/// buffered until a newline arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every event completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamEvent, BackendError>> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = decode_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that never got its newline
    pub fn finish(&mut self) -> Option<Result<StreamEvent, BackendError>> {
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line)
    }
}

fn decode_line(line: &[u8]) -> Option<Result<StreamEvent, BackendError>> {
    let line = match std::str::from_utf8(line) {
        Ok(line) => line.trim_end_matches(['\r', '\n']),
        Err(e) => return Some(Err(BackendError::decode(format!("Invalid UTF-8 in stream: {e}")))),
    };
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }

    let value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => {
            return Some(Err(BackendError::decode(format!(
                "Failed to parse stream event: {e} - data: {payload}"
            ))))
        }
    };
    match serde_json::from_value::<StreamEvent>(value) {
        Ok(event) => Some(Ok(event)),
        Err(e) => {
            tracing::debug!(payload, error = %e, "Skipping unknown stream event");
            None
        }
    }
}
