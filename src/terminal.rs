//! Line-oriented terminal front end
//!
//! Input lines become runtime commands; client events are written as text.

use crate::runtime::{ClientEvent, Command};
use crate::store::{ChatMessage, Role};
use crate::voice::{InputMode, SessionState};
use std::io::{self, Write};
use std::path::PathBuf;

pub const HELP: &str = "\
Commands:
  /voice                         enter voice mode
  /exit                          leave voice mode
  /mute, /unmute                 toggle the microphone
  /abort                         cancel the response in progress
  /dismiss                       dismiss the current error
  /new                           start a new conversation
  /image <path>... [-- message]  ask about one or more images
  /help                          show this help
  /quit                          quit
Anything else is sent as a message.";

/// What a line of input asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Help,
    Nothing,
}

/// Parse one line of user input
pub fn parse_line(line: &str) -> Result<Input, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Nothing);
    }
    if !line.starts_with('/') {
        return Ok(Input::Command(Command::SendText(line.to_string())));
    }

    let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let command = match name {
        "/voice" => Command::EnterVoiceMode,
        "/exit" => Command::ExitVoiceMode,
        "/mute" => Command::Mute,
        "/unmute" => Command::Unmute,
        "/abort" => Command::Abort,
        "/dismiss" => Command::ClearError,
        "/new" => Command::ClearConversation,
        "/quit" => Command::Shutdown,
        "/help" => return Ok(Input::Help),
        "/image" => parse_image(rest)?,
        _ => return Err(format!("Unknown command {name}, try /help")),
    };
    Ok(Input::Command(command))
}

fn parse_image(rest: &str) -> Result<Command, String> {
    let (paths, message) = match rest.split_once("--") {
        Some((paths, message)) => (paths, Some(message.trim().to_string())),
        None => (rest, None),
    };
    let paths: Vec<PathBuf> = paths.split_whitespace().map(PathBuf::from).collect();
    if paths.is_empty() {
        return Err("Usage: /image <path>... [-- message]".to_string());
    }
    Ok(Command::SendImages {
        paths,
        message: message.filter(|m| !m.is_empty()),
    })
}

fn state_label(state: &SessionState, voice_mode: bool) -> &'static str {
    match state {
        SessionState::Idle if !voice_mode => "text mode",
        SessionState::Idle | SessionState::Ready => "ready",
        SessionState::Listening => "listening",
        SessionState::Processing => "thinking",
        SessionState::Speaking { .. } => "speaking",
        SessionState::Greeting { .. } => "greeting",
        SessionState::Error { .. } => "error",
    }
}

/// Writes client events as they arrive
pub struct Renderer<W: Write> {
    out: W,
    /// Message being typed out and how many bytes of it are already printed
    live: Option<(String, usize)>,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, live: None }
    }

    pub fn render(&mut self, event: &ClientEvent) -> io::Result<()> {
        match event {
            ClientEvent::StateChanged {
                state,
                muted,
                voice_mode,
            } => {
                let mic = if *voice_mode && !*muted { "on" } else { "off" };
                self.line(&format!("[{} | mic {mic}]", state_label(state, *voice_mode)))?;
            }
            ClientEvent::TranscriptUpdated { text } if !text.is_empty() => {
                self.line(&format!("  ~ {text}"))?;
            }
            ClientEvent::TranscriptUpdated { .. } => {}
            ClientEvent::Render { message_id, text } => self.type_out(message_id, text)?,
            ClientEvent::MessageAppended { message } => self.message(message)?,
            ClientEvent::Status { status } => self.line(&format!("[{status}]"))?,
            ClientEvent::Sources { sources } if !sources.is_empty() => {
                let best = sources.iter().map(|s| s.similarity).fold(0.0_f64, f64::max);
                self.line(&format!("[{} sources, best match {best:.2}]", sources.len()))?;
            }
            ClientEvent::Sources { .. } => {}
            ClientEvent::Notice { message } => {
                self.line(&format!("! {message} (/dismiss to clear)"))?;
            }
            ClientEvent::Rejected { reason } => self.line(&format!("! {reason}"))?,
            ClientEvent::ConversationCleared => self.line("[new conversation]")?,
        }
        self.out.flush()
    }

    fn type_out(&mut self, message_id: &str, text: &str) -> io::Result<()> {
        let printed = match &self.live {
            Some((id, printed)) if id == message_id => *printed,
            _ => {
                self.end_live()?;
                write!(self.out, "assistant: ")?;
                0
            }
        };
        // Frames only ever extend the previous one
        if let Some(delta) = text.get(printed..) {
            write!(self.out, "{delta}")?;
        }
        self.live = Some((message_id.to_string(), text.len()));
        Ok(())
    }

    fn message(&mut self, message: &ChatMessage) -> io::Result<()> {
        let printed = match &self.live {
            Some((id, printed)) if *id == message.id => Some(*printed),
            _ => None,
        };
        match (printed, message.role) {
            (Some(printed), Role::Assistant) => {
                let rest = message.content.get(printed..).unwrap_or_default();
                writeln!(self.out, "{rest}")?;
                self.live = None;
                Ok(())
            }
            (None, Role::Assistant) => self.line(&format!("assistant: {}", message.content)),
            (_, Role::User) if message.mode == Some(InputMode::Voice) => {
                self.line(&format!("you (spoken): {}", message.content))
            }
            (_, Role::User) => self.line(&format!("you: {}", message.content)),
        }
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        self.end_live()?;
        writeln!(self.out, "{text}")
    }

    /// Break out of a half-typed message
    fn end_live(&mut self) -> io::Result<()> {
        if self.live.take().is_some() {
            writeln!(self.out)?;
        }
        Ok(())
    }
}
