//! Configuration from `VOICE_CHAT_*` environment variables

use crate::debounce::DEFAULT_SILENCE_WINDOW;
use crate::speech::SpeechCommand;
use crate::typewriter::DEFAULT_TICK;
use crate::voice::DEFAULT_GREETING;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000/api";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub backend_url: String,
    pub api_token: Option<String>,
    pub streaming: bool,
    pub conversation_id: Option<String>,
    pub stt_command: Option<SpeechCommand>,
    pub tts_command: Option<SpeechCommand>,
    pub silence_window: Duration,
    pub tick: Duration,
    pub greeting: String,
    /// No timeout unless set; the user can always abort
    pub stream_idle_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            backend_url: get("VOICE_CHAT_BACKEND_URL").unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            api_token: get("VOICE_CHAT_API_TOKEN"),
            streaming: match get("VOICE_CHAT_STREAMING") {
                Some(value) => parse_bool("VOICE_CHAT_STREAMING", &value)?,
                None => true,
            },
            conversation_id: get("VOICE_CHAT_CONVERSATION_ID"),
            stt_command: get("VOICE_CHAT_STT_COMMAND").and_then(|v| SpeechCommand::parse(&v)),
            tts_command: get("VOICE_CHAT_TTS_COMMAND").and_then(|v| SpeechCommand::parse(&v)),
            silence_window: match get("VOICE_CHAT_SILENCE_MS") {
                Some(value) => Duration::from_millis(parse_positive("VOICE_CHAT_SILENCE_MS", &value)?),
                None => DEFAULT_SILENCE_WINDOW,
            },
            tick: match get("VOICE_CHAT_TICK_MS") {
                Some(value) => Duration::from_millis(parse_positive("VOICE_CHAT_TICK_MS", &value)?),
                None => DEFAULT_TICK,
            },
            greeting: get("VOICE_CHAT_GREETING").unwrap_or_else(|| DEFAULT_GREETING.to_string()),
            stream_idle_timeout: get("VOICE_CHAT_STREAM_IDLE_TIMEOUT_SECS")
                .map(|value| parse_positive("VOICE_CHAT_STREAM_IDLE_TIMEOUT_SECS", &value))
                .transpose()?
                .map(Duration::from_secs),
        })
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            expected: "a boolean",
        }),
    }
}

fn parse_positive(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            expected: "a positive integer",
        }),
    }
}
