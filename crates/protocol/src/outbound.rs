//! Client → Server envelopes

use serde::{Deserialize, Serialize};

/// Envelopes sent from the client over the chat socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundEnvelope {
    /// A user-authored chat message
    #[serde(rename_all = "camelCase")]
    User {
        id: i64,
        chat_id: String,
        content: String,
        timestamp: String,
        user_id: String,
    },
}

impl OutboundEnvelope {
    /// Build the wire envelope for a user message
    pub fn user(
        id: i64,
        chat_id: impl Into<String>,
        content: impl Into<String>,
        timestamp: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self::User {
            id,
            chat_id: chat_id.into(),
            content: content.into(),
            timestamp: timestamp.into(),
            user_id: user_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_envelope_matches_wire_shape() {
        let env = OutboundEnvelope::user(1736000000000, "chat-1", "hello", "100Z", "alice");
        let json = serde_json::to_value(&env).expect("serialize");
        assert_eq!(json["type"], "user");
        assert_eq!(json["chatId"], "chat-1");
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["content"], "hello");
        assert_eq!(json["id"], 1736000000000i64);
    }
}
