//! Real-time session core for the Echo chat client.
//!
//! One conversation is served by two cooperating actor tasks: a
//! reconnection supervisor that owns the WebSocket and hides retry churn,
//! and a session coordinator that owns the message log, the optimistic
//! send path, and the pending action slot. Citation parsing and the
//! scroll-and-highlight reveal flow sit alongside as pure modules any
//! surface can drive.

pub mod api;
pub mod citation;
pub mod config;
pub mod error;
pub mod logging;
pub mod reveal;
pub mod session;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
mod testutil;

pub use api::{ApiClient, EchoApi};
pub use config::Config;
pub use error::{ApiError, SendError, TransportError};
pub use session::{
    ActionResolution, HistoryLoad, SendOutcome, SessionEvent, SessionHandle, SessionSnapshot,
};
pub use supervisor::{ConnectionState, SupervisorHandle};
pub use transport::WsDialer;
