//! Core types shared across the protocol

use serde::{Deserialize, Serialize};

/// Opaque identifier for one chat conversation.
/// All other entities are scoped to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random conversation id
    pub fn random() -> Self {
        Self(crate::new_conversation_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Where a message in the log came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Local,
    Remote,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A message in the conversation log.
///
/// `id`, `role` and `content` are immutable once the message has been
/// appended — corrections arrive as new messages. Log order is insertion
/// order, not timestamp order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub origin: Origin,
    pub role: Role,
    pub content: String,
    pub created_at: String,
    /// Ordered list of distinct reference keys declared for this message.
    /// Gives citation markers in `content` their stable display index.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quotes: Vec<i64>,
}

/// One entry returned by the history read API.
///
/// The backend stores both user and assistant turns; `kind` distinguishes
/// them the same way the live envelope `type` field does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub quotes: Vec<i64>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl HistoryEntry {
    /// Convert a stored history entry into a log message.
    /// Anything not explicitly marked as a user turn renders as assistant.
    pub fn into_message(self) -> ChatMessage {
        let role = match self.kind.as_deref() {
            Some("user") => Role::User,
            _ => Role::Assistant,
        };
        ChatMessage {
            id: self.id,
            origin: Origin::Remote,
            role,
            content: self.content,
            created_at: self.timestamp,
            quotes: self.quotes,
        }
    }
}
