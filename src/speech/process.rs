//! Speech engine backed by external recognizer and synthesizer commands
//!
//! The STT command writes recognized segments to stdout, one per line; each
//! line grows the transcript. The TTS command reads the text to speak on stdin
//! and exits when playback is done.

use super::{Capabilities, CaptureEvent, SpeechEngine, SpeechError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// `EX_NOPERM` from sysexits.h; a recognizer exiting with it was refused the microphone
const EXIT_NO_PERMISSION: i32 = 77;

/// `EX_UNAVAILABLE` from sysexits.h; a cloud recognizer could not reach its service
const EXIT_UNAVAILABLE: i32 = 69;

/// An external program plus its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl SpeechCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a command line on whitespace. Returns `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program, parts.map(String::from).collect()))
    }

    /// Resolve the program on `PATH`, dropping the command if it is not installed
    pub fn resolve(self) -> Option<Self> {
        match which::which(&self.program) {
            Ok(program) => Some(Self { program, ..self }),
            Err(e) => {
                tracing::warn!(program = %self.program.display(), error = %e, "Speech command not found");
                None
            }
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);
        command
    }
}

struct CaptureHandle {
    stop: CancellationToken,
}

struct PlaybackHandle {
    id: u64,
    cancel: CancellationToken,
}

/// Speech engine that drives STT/TTS child processes
pub struct ProcessSpeechEngine {
    stt: Option<SpeechCommand>,
    tts: Option<SpeechCommand>,
    events: broadcast::Sender<CaptureEvent>,
    capture: Mutex<Option<CaptureHandle>>,
    playback: Mutex<Option<PlaybackHandle>>,
    next_playback: AtomicU64,
}

impl ProcessSpeechEngine {
    pub fn new(stt: Option<SpeechCommand>, tts: Option<SpeechCommand>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            stt,
            tts,
            events,
            capture: Mutex::new(None),
            playback: Mutex::new(None),
            next_playback: AtomicU64::new(1),
        }
    }

    fn spawn_recognizer(stt: &SpeechCommand) -> Result<Child, SpeechError> {
        stt.command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    SpeechError::permission_denied(format!("Capture refused: {e}"))
                }
                std::io::ErrorKind::NotFound => {
                    SpeechError::not_supported(format!("Recognizer not available: {e}"))
                }
                _ => SpeechError::recognition_failed(format!("Failed to start recognizer: {e}")),
            })
    }

    fn finish_playback(&self, id: u64) {
        let mut slot = self.playback.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|handle| handle.id == id) {
            *slot = None;
        }
    }
}

/// Pump recognizer output into transcript events until it exits or is stopped
async fn run_capture(
    mut child: Child,
    stop: CancellationToken,
    events: broadcast::Sender<CaptureEvent>,
) {
    let Some(stdout) = child.stdout.take() else {
        let _ = events.send(CaptureEvent::Failed {
            error: SpeechError::recognition_failed("Recognizer has no output"),
        });
        stop.cancel();
        return;
    };
    let mut lines = LinesStream::new(BufReader::new(stdout).lines());
    let mut transcript = String::new();

    loop {
        tokio::select! {
            biased;

            () = stop.cancelled() => {
                let _ = child.kill().await;
                tracing::debug!("Capture stopped");
                return;
            }

            line = lines.next() => match line {
                Some(Ok(line)) => {
                    let segment = line.trim();
                    if segment.is_empty() {
                        continue;
                    }
                    if !transcript.is_empty() {
                        transcript.push(' ');
                    }
                    transcript.push_str(segment);
                    let _ = events.send(CaptureEvent::Transcript { text: transcript.clone() });
                }
                Some(Err(e)) => {
                    let _ = child.kill().await;
                    if !stop.is_cancelled() {
                        let _ = events.send(CaptureEvent::Failed {
                            error: SpeechError::recognition_failed(format!("Failed to read recognizer output: {e}")),
                        });
                    }
                    break;
                }
                None => {
                    let status = child.wait().await;
                    if !stop.is_cancelled() {
                        let error = match status {
                            Ok(status) if status.success() => None,
                            Ok(status) if status.code() == Some(EXIT_NO_PERMISSION) => {
                                Some(SpeechError::permission_denied("Recognizer was refused the microphone"))
                            }
                            Ok(status) if status.code() == Some(EXIT_UNAVAILABLE) => {
                                Some(SpeechError::network("Recognizer could not reach its service"))
                            }
                            Ok(status) => Some(SpeechError::recognition_failed(format!("Recognizer exited with {status}"))),
                            Err(e) => Some(SpeechError::recognition_failed(format!("Recognizer wait failed: {e}"))),
                        };
                        let event = match error {
                            Some(error) => {
                                tracing::warn!(error = %error, "Capture failed");
                                CaptureEvent::Failed { error }
                            }
                            None => {
                                tracing::info!("Recognizer exited on its own");
                                CaptureEvent::Ended
                            }
                        };
                        let _ = events.send(event);
                    }
                    break;
                }
            }
        }
    }

    // Marks the capture as no longer running so the next start spawns afresh
    stop.cancel();
}

#[async_trait]
impl SpeechEngine for ProcessSpeechEngine {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            capture: self.stt.is_some(),
            playback: self.tts.is_some(),
        }
    }

    async fn start_capture(&self) -> Result<(), SpeechError> {
        let Some(stt) = &self.stt else {
            return Err(SpeechError::not_supported("No speech recognizer configured"));
        };

        let mut slot = self.capture.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|handle| !handle.stop.is_cancelled()) {
            return Ok(());
        }

        let child = Self::spawn_recognizer(stt)?;
        let stop = CancellationToken::new();
        tokio::spawn(run_capture(child, stop.clone(), self.events.clone()));
        *slot = Some(CaptureHandle { stop });
        tracing::info!(program = %stt.program.display(), "Capture started");
        Ok(())
    }

    fn stop_capture(&self) {
        let handle = self.capture.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            handle.stop.cancel();
        }
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let Some(tts) = &self.tts else {
            return Err(SpeechError::not_supported("No speech synthesizer configured"));
        };

        // The assistant must never hear itself
        self.stop_capture();

        let id = self.next_playback.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let previous = self
            .playback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(PlaybackHandle {
                id,
                cancel: cancel.clone(),
            });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        let result = async {
            let mut child = tts
                .command()
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|e| SpeechError::tts_failed(format!("Failed to start synthesizer: {e}")))?;

            let stdin = child.stdin.take();
            let playback = async {
                // Dropping stdin after the write signals end of text
                if let Some(mut stdin) = stdin {
                    stdin
                        .write_all(text.as_bytes())
                        .await
                        .map_err(|e| SpeechError::tts_failed(format!("Failed to send text: {e}")))?;
                }
                match child.wait().await {
                    Ok(status) if status.success() => Ok(()),
                    Ok(status) => Err(SpeechError::tts_failed(format!("Synthesizer exited with {status}"))),
                    Err(e) => Err(SpeechError::tts_failed(format!("Synthesizer wait failed: {e}"))),
                }
            };

            // A synthesizer that never drains stdin must not block cancellation
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    let _ = child.kill().await;
                    tracing::debug!(playback = id, "Playback cancelled");
                    Ok(())
                }

                result = playback => result,
            }
        }
        .await;

        self.finish_playback(id);
        result
    }

    fn cancel_playback(&self) {
        let handle = self.playback.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            handle.cancel.cancel();
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }
}
