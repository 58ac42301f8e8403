//! Echo Protocol
//!
//! Shared types for communication between the Echo chat client and backend.
//! These types are serialized as JSON over WebSocket and the history API.

use uuid::Uuid;

pub mod inbound;
pub mod outbound;
pub mod types;

pub use inbound::{ActionData, ActionKind, ActionPayload, InboundEnvelope, TodoProposal};
pub use outbound::OutboundEnvelope;
pub use types::*;

/// Generate a new unique conversation id
pub fn new_conversation_id() -> String {
    Uuid::new_v4().to_string()
}
