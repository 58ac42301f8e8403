//! Error types for the session core.
//!
//! Component-to-caller error signaling is by value — these enums cross
//! module boundaries instead of panics or anyhow blobs.

use thiserror::Error;

/// Failures raised by the transport layer (dial + socket IO)
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("socket error: {0}")]
    Socket(String),

    #[error("send failed: {0}")]
    Send(String),
}

/// Why an optimistic send was rolled back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The supervisor reports no open connection
    #[error("connection is not open")]
    Disconnected,

    /// The socket was open but the write was rejected
    #[error("transport rejected the frame")]
    SendFailed,
}

/// Failures from the history/commit HTTP API.
///
/// Status mapping follows the backend contract: 401 and 404 are
/// distinguished so the UI can phrase its retry affordance.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("resource not found")]
    NotFound,

    #[error("request timed out")]
    Timeout,

    #[error("api returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response body: {0}")]
    Body(String),

    #[error("no action is pending")]
    NoPendingAction,

    #[error("action proposal carries no usable todo")]
    EmptyProposal,
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ApiError::Timeout;
        }
        match err.status() {
            Some(status) if status.as_u16() == 401 => ApiError::Unauthorized,
            Some(status) if status.as_u16() == 404 => ApiError::NotFound,
            Some(status) => ApiError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => ApiError::Network(err.to_string()),
        }
    }
}
