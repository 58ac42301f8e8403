//! Reconnection supervisor — wraps one transport connection and hides
//! retry churn behind a single connected/disconnected signal.
//!
//! The supervisor runs as an independent tokio task owning the only
//! socket for its conversation. Callers talk to it through
//! `SupervisorHandle` (mpsc commands, watch state). Backoff is linear:
//! `base_delay × attempt`, bounded by a fixed attempt count; exhaustion
//! parks the actor in a terminal failed state until a manual reconnect.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use echo_protocol::InboundEnvelope;

use crate::config::Config;
use crate::transport::{parse_envelope, Conn, Dialer};

/// Lifecycle of the conversation's connection. Exactly one instance per
/// supervisor, published through a watch channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
    /// Transport error; terminal once retries are exhausted
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// Retry policy for one supervisor instance
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: std::time::Duration,
}

impl From<&Config> for RetryPolicy {
    fn from(cfg: &Config) -> Self {
        Self {
            max_attempts: cfg.max_reconnect_attempts,
            base_delay: cfg.reconnect_base_delay,
        }
    }
}

enum Command {
    Send {
        text: String,
        reply: oneshot::Sender<bool>,
    },
    Reconnect,
    Disconnect,
}

/// Handle to a running supervisor (cheap to Clone)
#[derive(Clone)]
pub struct SupervisorHandle {
    command_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl SupervisorHandle {
    /// Spawn a supervisor for `url`. Parsed inbound envelopes are forwarded
    /// over `inbound_tx`; lifecycle transitions over the returned watch.
    pub fn spawn<D: Dialer>(
        dialer: D,
        url: String,
        policy: RetryPolicy,
        inbound_tx: mpsc::Sender<InboundEnvelope>,
    ) -> (SupervisorHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(256);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let task = tokio::spawn(run(dialer, url, policy, command_rx, state_tx, inbound_tx));

        (
            SupervisorHandle {
                command_tx,
                state_rx,
            },
            task,
        )
    }

    /// Send one text frame. Returns `false` when the connection is not
    /// open or the write was rejected — the caller must treat that as a
    /// hard local failure; the supervisor does not retry sends.
    pub async fn send(&self, text: String) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .command_tx
            .send(Command::Send {
                text,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Watch receiver for lifecycle transitions
    pub fn state_rx(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Manual reconnect after terminal failure. A no-op while a connect
    /// attempt is already pending.
    pub async fn reconnect(&self) {
        let _ = self.command_tx.send(Command::Reconnect).await;
    }

    /// Close the socket, cancel any pending retry, and stop the actor.
    pub async fn disconnect(&self) {
        let _ = self.command_tx.send(Command::Disconnect).await;
    }
}

async fn run<D: Dialer>(
    dialer: D,
    url: String,
    policy: RetryPolicy,
    mut command_rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    inbound_tx: mpsc::Sender<InboundEnvelope>,
) {
    let mut attempts: u32 = 0;

    'connect: loop {
        // -- Dial with bounded linear backoff --------------------------------
        let mut conn = loop {
            attempts += 1;
            let _ = state_tx.send(ConnectionState::Connecting);

            match dialer.dial(&url).await {
                Ok(conn) => {
                    attempts = 0;
                    break conn;
                }
                Err(e) => {
                    warn!(
                        component = "supervisor",
                        event = "supervisor.dial.failed",
                        attempt = attempts,
                        max_attempts = policy.max_attempts,
                        error = %e,
                    );

                    if attempts >= policy.max_attempts {
                        let _ = state_tx.send(ConnectionState::Failed {
                            reason: e.to_string(),
                        });
                        // Terminal: park until manual reconnect or teardown.
                        loop {
                            match command_rx.recv().await {
                                Some(Command::Reconnect) => {
                                    attempts = 0;
                                    continue 'connect;
                                }
                                Some(Command::Send { reply, .. }) => {
                                    let _ = reply.send(false);
                                }
                                Some(Command::Disconnect) | None => {
                                    let _ = state_tx.send(ConnectionState::Closed);
                                    return;
                                }
                            }
                        }
                    }

                    // Linear backoff; Disconnect cancels the pending retry.
                    let deadline =
                        tokio::time::Instant::now() + policy.base_delay * attempts;
                    loop {
                        tokio::select! {
                            _ = tokio::time::sleep_until(deadline) => break,
                            cmd = command_rx.recv() => match cmd {
                                Some(Command::Send { reply, .. }) => {
                                    let _ = reply.send(false);
                                }
                                Some(Command::Reconnect) => {
                                    // Already reconnecting; no-op.
                                }
                                Some(Command::Disconnect) | None => {
                                    let _ = state_tx.send(ConnectionState::Closed);
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        };

        let _ = state_tx.send(ConnectionState::Open);
        info!(
            component = "supervisor",
            event = "supervisor.connected",
        );

        // -- Connected loop --------------------------------------------------
        enum Step {
            Inbound(Option<Result<String, crate::error::TransportError>>),
            Cmd(Option<Command>),
        }

        loop {
            let step = tokio::select! {
                frame = conn.recv() => Step::Inbound(frame),
                cmd = command_rx.recv() => Step::Cmd(cmd),
            };

            match step {
                Step::Inbound(Some(Ok(raw))) => {
                    if let Some(envelope) = parse_envelope(&raw) {
                        if inbound_tx.send(envelope).await.is_err() {
                            // Session gone; nothing left to feed.
                            conn.close().await;
                            let _ = state_tx.send(ConnectionState::Closed);
                            return;
                        }
                    }
                }
                Step::Inbound(Some(Err(e))) => {
                    warn!(
                        component = "supervisor",
                        event = "supervisor.socket.error",
                        error = %e,
                    );
                    conn.close().await;
                    let _ = state_tx.send(ConnectionState::Failed {
                        reason: e.to_string(),
                    });
                    continue 'connect;
                }
                Step::Inbound(None) => {
                    info!(
                        component = "supervisor",
                        event = "supervisor.socket.closed_by_peer",
                    );
                    let _ = state_tx.send(ConnectionState::Closed);
                    continue 'connect;
                }
                Step::Cmd(Some(Command::Send { text, reply })) => {
                    let ok = conn.send(text).await.is_ok();
                    let _ = reply.send(ok);
                    if !ok {
                        conn.close().await;
                        let _ = state_tx.send(ConnectionState::Failed {
                            reason: "send failed".to_string(),
                        });
                        continue 'connect;
                    }
                }
                Step::Cmd(Some(Command::Reconnect)) => {
                    // Already connected; no-op.
                }
                Step::Cmd(Some(Command::Disconnect)) | Step::Cmd(None) => {
                    conn.close().await;
                    let _ = state_tx.send(ConnectionState::Closed);
                    return;
                }
            }
        }
    }
}
