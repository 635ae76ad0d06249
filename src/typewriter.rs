//! Character-by-character rendering of assistant responses
//!
//! The rendered text advances on a fixed tick, independent of how fast the
//! target grows. `StreamingMessage::advance` is a pure reducer over elapsed
//! ticks; the runtime owns the timer.

use std::time::Duration;

/// Default tick interval
pub const DEFAULT_TICK: Duration = Duration::from_millis(20);

/// Rendering rates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypewriterConfig {
    pub tick: Duration,
    /// Characters per tick while close to the target
    pub normal_rate: usize,
    /// Characters per tick while far behind
    pub catch_up_rate: usize,
    /// Gap (in characters) above which the catch-up rate applies
    pub catch_up_threshold: usize,
}

impl Default for TypewriterConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            normal_rate: 1,
            catch_up_rate: 3,
            catch_up_threshold: 50,
        }
    }
}

impl TypewriterConfig {
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Characters to reveal in one tick given how far behind we are
    pub fn chars_per_tick(&self, gap: usize) -> usize {
        let rate = if gap > self.catch_up_threshold {
            self.catch_up_rate
        } else {
            self.normal_rate
        };
        rate.max(1).min(gap)
    }
}

/// Result of advancing a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing new to show
    Idle,
    /// Revealed more characters
    Rendered { appended: usize },
    /// Caught up with a completed target; reported once
    Finished,
}

/// A response being revealed; `rendered_text` is always a prefix of `target_text`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingMessage {
    id: String,
    target_text: String,
    rendered_text: String,
    target_chars: usize,
    rendered_chars: usize,
    is_complete: bool,
    finished: bool,
}

impl StreamingMessage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target_text: String::new(),
            rendered_text: String::new(),
            target_chars: 0,
            rendered_chars: 0,
            is_complete: false,
            finished: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target_text(&self) -> &str {
        &self.target_text
    }

    pub fn rendered_text(&self) -> &str {
        &self.rendered_text
    }

    /// Characters still to reveal
    pub fn gap(&self) -> usize {
        self.target_chars - self.rendered_chars
    }

    /// Grow the target (streaming path)
    fn append_target(&mut self, chunk: &str) {
        if self.is_complete {
            tracing::warn!(message_id = %self.id, "Ignoring chunk for completed message");
            return;
        }
        self.target_text.push_str(chunk);
        self.target_chars += chunk.chars().count();
    }

    /// Replace the target wholesale (non-streaming path)
    ///
    /// Rendered text is cut back to the longest common prefix so it stays a
    /// prefix of the new target; the remainder animates as usual.
    fn set_target(&mut self, text: &str) {
        let mut common_bytes = 0;
        let mut common_chars = 0;
        for (a, b) in self.rendered_text.chars().zip(text.chars()) {
            if a != b {
                break;
            }
            common_bytes += a.len_utf8();
            common_chars += 1;
        }
        self.rendered_text.truncate(common_bytes);
        self.rendered_chars = common_chars;
        self.target_text.clear();
        self.target_text.push_str(text);
        self.target_chars = text.chars().count();
    }

    fn mark_complete(&mut self) {
        self.is_complete = true;
    }

    /// Reveal characters for `elapsed_ticks` ticks
    pub fn advance(&mut self, config: &TypewriterConfig, elapsed_ticks: u32) -> TickOutcome {
        if self.finished {
            return TickOutcome::Idle;
        }

        let mut appended = 0;
        for _ in 0..elapsed_ticks {
            let gap = self.gap();
            if gap == 0 {
                break;
            }
            let count = config.chars_per_tick(gap);
            let rest = self.target_text.get(self.rendered_text.len()..).unwrap_or_default();
            self.rendered_text.extend(rest.chars().take(count));
            self.rendered_chars += count;
            appended += count;
        }

        if self.is_complete && self.gap() == 0 {
            self.finished = true;
            TickOutcome::Finished
        } else if appended > 0 {
            TickOutcome::Rendered { appended }
        } else {
            TickOutcome::Idle
        }
    }
}

/// Owns the live message of the current turn
#[derive(Debug, Default)]
pub struct ResponseTypewriter {
    config: TypewriterConfig,
    message: Option<StreamingMessage>,
}

impl ResponseTypewriter {
    pub fn new(config: TypewriterConfig) -> Self {
        Self {
            config,
            message: None,
        }
    }

    pub fn config(&self) -> &TypewriterConfig {
        &self.config
    }

    pub fn current(&self) -> Option<&StreamingMessage> {
        self.message.as_ref()
    }

    /// Whether the timer needs to run
    pub fn is_active(&self) -> bool {
        self.message.is_some()
    }

    /// Start a new message, replacing any previous one
    pub fn begin(&mut self, id: impl Into<String>) {
        self.message = Some(StreamingMessage::new(id));
    }

    pub fn push_chunk(&mut self, chunk: &str) {
        if let Some(message) = self.message.as_mut() {
            message.append_target(chunk);
        }
    }

    pub fn set_target(&mut self, text: &str) {
        if let Some(message) = self.message.as_mut() {
            message.set_target(text);
        }
    }

    pub fn complete(&mut self) {
        if let Some(message) = self.message.as_mut() {
            message.mark_complete();
        }
    }

    /// Drop the live message without finishing it
    pub fn discard(&mut self) -> Option<StreamingMessage> {
        self.message.take()
    }

    /// Advance the live message; on `Finished` the message is handed back
    pub fn tick(&mut self, elapsed_ticks: u32) -> (TickOutcome, Option<StreamingMessage>) {
        let Some(message) = self.message.as_mut() else {
            return (TickOutcome::Idle, None);
        };
        let outcome = message.advance(&self.config, elapsed_ticks);
        if outcome == TickOutcome::Finished {
            (outcome, self.message.take())
        } else {
            (outcome, None)
        }
    }
}
