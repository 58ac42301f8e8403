//! Transport layer — one WebSocket per conversation.
//!
//! The `Dialer`/`Conn` traits are the seam between the reconnection
//! supervisor and the network: production code dials tokio-tungstenite
//! sockets, tests inject scripted connections.

use std::future::Future;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use echo_protocol::{ConversationId, InboundEnvelope};

use crate::error::TransportError;

/// Build the socket URL for one conversation:
/// `{base_ws_url}?chatId={conversation_id}`.
pub fn chat_url(base_ws_url: &str, conversation_id: &ConversationId) -> String {
    format!(
        "{}?chatId={}",
        base_ws_url,
        urlencoding::encode(conversation_id.as_str())
    )
}

/// An established bidirectional connection
pub trait Conn: Send + 'static {
    /// Send one text frame. An error means the socket is no longer usable.
    fn send(&mut self, text: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Next inbound text frame. `None` is a clean close; `Some(Err(_))` a
    /// transport error. Control frames are handled internally.
    fn recv(&mut self) -> impl Future<Output = Option<Result<String, TransportError>>> + Send;

    /// Close the socket. Subsequent sends fail.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens connections; owned by the supervisor
pub trait Dialer: Send + Sync + 'static {
    type Conn: Conn;

    fn dial(&self, url: &str) -> impl Future<Output = Result<Self::Conn, TransportError>> + Send;
}

/// Production dialer over tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsDialer;

pub struct WsConn {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Dialer for WsDialer {
    type Conn = WsConn;

    async fn dial(&self, url: &str) -> Result<WsConn, TransportError> {
        let (inner, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(WsConn { inner })
    }
}

impl Conn for WsConn {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Ping(data)) => {
                    let _ = self.inner.send(Message::Pong(data)).await;
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(TransportError::Socket(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.inner.close(None).await;
    }
}

/// Parse a raw text frame into an envelope. A malformed payload is dropped
/// with a logged warning — it never crashes the connection and never
/// reaches the session log.
pub fn parse_envelope(raw: &str) -> Option<InboundEnvelope> {
    match serde_json::from_str::<InboundEnvelope>(raw) {
        Ok(envelope) => {
            debug!(
                component = "transport",
                event = "transport.envelope.parsed",
                payload_bytes = raw.len(),
            );
            Some(envelope)
        }
        Err(e) => {
            warn!(
                component = "transport",
                event = "transport.envelope.parse_failed",
                error = %e,
                payload_bytes = raw.len(),
                payload_preview = %truncate_for_log(raw, 240),
                "Dropping malformed inbound payload"
            );
            None
        }
    }
}

fn truncate_for_log(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
