//! Silence detection over a growing transcript
//!
//! The debouncer never reads a clock itself; callers pass `now`, which keeps
//! the quiet-window logic testable without timers.

use crate::voice::{InputMode, Utterance};
use std::time::Duration;
use tokio::time::Instant;

/// Default quiet window before an utterance is considered complete
pub const DEFAULT_SILENCE_WINDOW: Duration = Duration::from_millis(1800);

/// Finalizes a transcript after a quiet window with no growth
#[derive(Debug)]
pub struct SilenceDebouncer {
    window: Duration,
    transcript: String,
    last_growth: Option<Instant>,
}

impl SilenceDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            transcript: String::new(),
            last_growth: None,
        }
    }

    /// Current live transcript
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Record the latest transcript. Returns `true` if it grew.
    ///
    /// A transcript that does not extend the buffered one starts a new buffer;
    /// recognizers restart their hypothesis after a stop.
    pub fn observe(&mut self, transcript: &str, now: Instant) -> bool {
        if transcript == self.transcript {
            return false;
        }
        if !transcript.starts_with(self.transcript.as_str()) {
            tracing::debug!("Transcript restarted");
        }
        self.transcript.clear();
        self.transcript.push_str(transcript);
        self.last_growth = Some(now);
        true
    }

    /// When the quiet window elapses, if anything is pending
    pub fn deadline(&self) -> Option<Instant> {
        if self.transcript.trim().is_empty() {
            return None;
        }
        self.last_growth.map(|at| at + self.window)
    }

    /// Finalize if the quiet window has elapsed
    pub fn poll(&mut self, now: Instant) -> Option<Utterance> {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.take(),
            _ => None,
        }
    }

    /// Finalize immediately (capture was explicitly stopped)
    pub fn flush(&mut self) -> Option<Utterance> {
        self.take()
    }

    /// Discard whatever is buffered
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.last_growth = None;
    }

    fn take(&mut self) -> Option<Utterance> {
        let text = self.transcript.trim().to_string();
        self.reset();
        if text.is_empty() {
            None
        } else {
            Some(Utterance::new(text, InputMode::Voice))
        }
    }
}

impl Default for SilenceDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_SILENCE_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalizes_after_quiet_window() {
        let mut debouncer = SilenceDebouncer::new(Duration::from_secs(2));
        let start = Instant::now();

        assert!(debouncer.observe("I have", start));
        assert!(debouncer.observe("I have a headache", start + Duration::from_millis(500)));

        // Growth at 0.5s pushes the deadline to 2.5s
        assert!(debouncer.poll(start + Duration::from_millis(2000)).is_none());
        let utterance = debouncer.poll(start + Duration::from_millis(2500)).unwrap();
        assert_eq!(utterance.text, "I have a headache");
        assert_eq!(utterance.mode, InputMode::Voice);

        // Buffer is cleared on finalization
        assert_eq!(debouncer.transcript(), "");
        assert!(debouncer.deadline().is_none());
    }

    #[test]
    fn test_repeated_transcript_is_not_growth() {
        let mut debouncer = SilenceDebouncer::new(Duration::from_secs(2));
        let start = Instant::now();

        debouncer.observe("hello", start);
        assert!(!debouncer.observe("hello", start + Duration::from_secs(1)));
        assert_eq!(debouncer.deadline(), Some(start + Duration::from_secs(2)));
    }

    #[test]
    fn test_never_finalizes_empty_transcript() {
        let mut debouncer = SilenceDebouncer::new(Duration::from_millis(100));
        let start = Instant::now();

        debouncer.observe("   ", start);
        assert!(debouncer.deadline().is_none());
        assert!(debouncer.poll(start + Duration::from_secs(10)).is_none());
        assert!(debouncer.flush().is_none());
    }

    #[test]
    fn test_flush_finalizes_immediately() {
        let mut debouncer = SilenceDebouncer::default();
        let start = Instant::now();

        debouncer.observe("call a doctor ", start);
        let utterance = debouncer.flush().unwrap();
        assert_eq!(utterance.text, "call a doctor");
        assert!(debouncer.flush().is_none());
    }

    #[test]
    fn test_reset_discards_pending_text() {
        let mut debouncer = SilenceDebouncer::default();
        let start = Instant::now();

        debouncer.observe("half a sentence", start);
        debouncer.reset();
        assert!(debouncer.poll(start + Duration::from_secs(60)).is_none());
    }
}
