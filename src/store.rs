//! Conversation storage
//!
//! Persistence itself belongs to an external collaborator; the client only
//! appends finished messages and reloads a conversation's history.

use crate::backend::Source;
use crate::voice::InputMode;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A finished entry in the visible transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// How the user produced it; `None` for assistant messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<InputMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, mode: InputMode) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
            mode: Some(mode),
            sources: vec![],
        }
    }

    pub fn assistant(id: impl Into<String>, content: impl Into<String>, sources: Vec<Source>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
            mode: None,
            sources,
        }
    }
}

/// Storage for conversation messages
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message to the conversation
    async fn add_message(&self, conversation_id: &str, message: &ChatMessage) -> Result<(), String>;

    /// All messages of a conversation, oldest first
    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, String>;
}

#[async_trait]
impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    async fn add_message(&self, conversation_id: &str, message: &ChatMessage) -> Result<(), String> {
        (**self).add_message(conversation_id, message).await
    }

    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, String> {
        (**self).load_messages(conversation_id).await
    }
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    conversations: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn add_message(&self, conversation_id: &str, message: &ChatMessage) -> Result<(), String> {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(conversation_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, String> {
        Ok(self
            .conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }
}
