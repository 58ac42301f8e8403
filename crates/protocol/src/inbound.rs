//! Server → Client envelopes

use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, Origin, Role};

/// Envelopes received from the server over the chat socket.
///
/// A frame that does not parse as one of these is dropped by the transport
/// with a logged warning — it never reaches the session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundEnvelope {
    /// An assistant reply to append to the log
    #[serde(rename_all = "camelCase")]
    Message {
        #[serde(default)]
        id: i64,
        #[serde(default)]
        chat_id: String,
        content: String,
        #[serde(default)]
        timestamp: String,
        #[serde(default)]
        quotes: Vec<i64>,
    },
    /// A user message echoed back for another participant in the chat
    #[serde(rename_all = "camelCase")]
    User {
        #[serde(default)]
        id: i64,
        #[serde(default)]
        chat_id: String,
        content: String,
        #[serde(default)]
        timestamp: String,
        #[serde(default)]
        user_id: Option<String>,
    },
    /// An out-of-band actionable proposal. Not part of the log — the UI
    /// accepts or declines it through the commit API.
    Action { data: ActionData },
}

impl InboundEnvelope {
    /// Conversation id carried by the envelope, if any
    pub fn chat_id(&self) -> Option<&str> {
        match self {
            Self::Message { chat_id, .. } | Self::User { chat_id, .. } => {
                (!chat_id.is_empty()).then_some(chat_id.as_str())
            }
            Self::Action { .. } => None,
        }
    }

    /// Convert a message-bearing envelope into a log entry.
    /// Returns `None` for action envelopes.
    pub fn into_message(self) -> Option<ChatMessage> {
        match self {
            Self::Message {
                id,
                content,
                timestamp,
                quotes,
                ..
            } => Some(ChatMessage {
                id,
                origin: Origin::Remote,
                role: Role::Assistant,
                content,
                created_at: timestamp,
                quotes,
            }),
            Self::User {
                id,
                content,
                timestamp,
                ..
            } => Some(ChatMessage {
                id,
                origin: Origin::Remote,
                role: Role::User,
                content,
                created_at: timestamp,
                quotes: Vec::new(),
            }),
            Self::Action { .. } => None,
        }
    }
}

/// Payload of an `action` envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionData {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// JSON string carrying the proposal body (`{"todos":[...]}`)
    pub message: String,
}

impl ActionData {
    /// Parse the embedded JSON string into its todo list
    pub fn parse_payload(&self) -> Result<ActionPayload, serde_json::Error> {
        serde_json::from_str(&self.message)
    }
}

/// What the action proposes to do with its todos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Save a todo to the project panel
    Add,
    /// Send a reminder about a todo
    Send,
}

/// The decoded body of an action's `message` field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPayload {
    #[serde(default)]
    pub todos: Vec<TodoProposal>,
}

/// One proposed todo carried by an action envelope.
/// `todo_id` keys are strings scoped by entity type (`Task…`, `Issue…`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoProposal {
    pub todo_id: String,
    #[serde(default)]
    pub todo_name: String,
    #[serde(default)]
    pub todo_desc: String,
    #[serde(default)]
    pub qtalk_id: String,
}

impl TodoProposal {
    /// Whether the id carries a known entity-type prefix
    pub fn has_valid_id(&self) -> bool {
        self.todo_id.starts_with("Task") || self.todo_id.starts_with("Issue")
    }
}
