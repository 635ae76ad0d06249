//! Wire types for the chat backend

use serde::{Deserialize, Serialize};

/// A retrieved passage backing an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub content: String,
    #[serde(default)]
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub message: String,
    #[serde(default)]
    pub sources: Option<Vec<Source>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionResponse {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub final_answer: String,
    #[serde(default)]
    pub sources: Option<Vec<Source>>,
}

/// One `data:` payload of the streaming endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEvent {
    ConversationId(String),
    Status(String),
    Chunk(String),
    Sources(Vec<Source>),
    Done(bool),
    Error(String),
}

/// An image ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Final result of a non-streamed exchange
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub conversation_id: Option<String>,
    pub text: String,
    pub sources: Vec<Source>,
}

impl From<ChatResponse> for Reply {
    fn from(response: ChatResponse) -> Self {
        Self {
            conversation_id: Some(response.conversation_id),
            text: response.message,
            sources: response.sources.unwrap_or_default(),
        }
    }
}

impl From<VisionResponse> for Reply {
    fn from(response: VisionResponse) -> Self {
        Self {
            conversation_id: response.conversation_id,
            text: response.final_answer,
            sources: response.sources.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_events_are_single_key_objects() {
        let chunk: StreamEvent = serde_json::from_str(r#"{"chunk": "Hel"}"#).unwrap();
        assert_eq!(chunk, StreamEvent::Chunk("Hel".into()));

        let done: StreamEvent = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert_eq!(done, StreamEvent::Done(true));

        let sources: StreamEvent =
            serde_json::from_str(r#"{"sources": [{"content": "Rest helps.", "similarity": 0}]}"#)
                .unwrap();
        assert_eq!(
            sources,
            StreamEvent::Sources(vec![Source {
                content: "Rest helps.".into(),
                similarity: 0.0
            }])
        );
    }

    #[test]
    fn test_chat_request_omits_missing_conversation() {
        let json = serde_json::to_value(ChatRequest {
            message: "hi".into(),
            conversation_id: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"message": "hi"}));
    }

    #[test]
    fn test_chat_response_tolerates_null_sources() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"conversation_id": "c1", "message": "Hello", "role": "assistant", "sources": null}"#,
        )
        .unwrap();
        let reply = Reply::from(response);
        assert_eq!(reply.conversation_id.as_deref(), Some("c1"));
        assert!(reply.sources.is_empty());
    }
}
