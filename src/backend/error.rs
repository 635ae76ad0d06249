//! Backend error types

use thiserror::Error;

/// Backend error with classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Network, message)
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(BackendErrorKind::Http, message)
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Decode, message)
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Stream, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::InvalidInput, message)
    }

    /// Map a transport error from reqwest
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::network(format!("Request timeout: {error}"))
        } else if error.is_connect() {
            Self::network(format!("Connection failed: {error}"))
        } else if error.is_decode() {
            Self::decode(format!("Failed to decode response: {error}"))
        } else if let Some(status) = error.status() {
            Self::http(status.as_u16(), error.to_string())
        } else {
            Self::network(format!("Request failed: {error}"))
        }
    }

    /// Classify a non-success response; FastAPI bodies carry the reason in `detail`
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string());

        let message = match status.as_u16() {
            401 | 403 => format!("Authentication failed: {detail}"),
            404 => format!("Not found: {detail}"),
            400 | 422 => format!("Invalid request: {detail}"),
            500..=599 => format!("Server error: {detail}"),
            _ => format!("HTTP {status}: {detail}"),
        };
        Self::http(status.as_u16(), message)
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Connection failures and timeouts
    Network,
    /// Non-success HTTP status
    Http,
    /// Response body did not match the expected shape
    Decode,
    /// The backend reported an error mid-stream, or the stream broke
    Stream,
    /// Rejected before anything was sent
    InvalidInput,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_classification_uses_detail() {
        let err = BackendError::from_status(
            StatusCode::NOT_FOUND,
            r#"{"detail": "Conversation not found"}"#,
        );
        assert_eq!(err.kind, BackendErrorKind::Http);
        assert_eq!(err.status, Some(404));
        assert_eq!(err.message, "Not found: Conversation not found");
    }

    #[test]
    fn test_status_classification_plain_body() {
        let err = BackendError::from_status(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(err.message, "Server error: upstream down");

        let err = BackendError::from_status(StatusCode::UNAUTHORIZED, "");
        assert!(err.message.starts_with("Authentication failed"));
    }
}
