//! Session coordinator — the single writer for one conversation's state.
//!
//! Runs as an actor task owning the message log and the pending action
//! slot. Callers interact through `SessionHandle`: commands go over an
//! mpsc channel with oneshot replies, reads go through a lock-free
//! `ArcSwap` snapshot, and UI-relevant changes stream out as
//! `SessionEvent`s.
//!
//! Sends are optimistic: the local message is appended and published
//! before the frame goes out, and rolled back by id if the transport
//! refuses it. Inbound envelopes append in arrival order regardless of
//! their timestamps.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use echo_protocol::{
    ActionData, ActionKind, ChatMessage, ConversationId, InboundEnvelope, Origin,
    OutboundEnvelope, Role,
};

use crate::api::EchoApi;
use crate::config::Config;
use crate::error::{ApiError, SendError};
use crate::supervisor::{ConnectionState, RetryPolicy, SupervisorHandle};
use crate::transport::{chat_url, Dialer};

/// Immutable view of the session, swapped atomically on every mutation
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub chat_id: ConversationId,
    pub messages: Vec<ChatMessage>,
    pub pending_action: Option<ActionData>,
}

/// Outcome of one send attempt
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// Appended to the log and accepted by the transport
    Sent { id: i64 },
    /// Appended, refused by the transport, removed again. The original
    /// text comes back so the caller can restore it to the input line.
    RolledBack { text: String, reason: SendError },
}

/// Outcome of a history load request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryLoad {
    Loaded(usize),
    /// The log already holds messages; history never clobbers them
    SkippedNonEmpty,
}

/// Outcome of resolving the pending action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionResolution {
    Committed { todos: usize },
    Declined,
}

/// Changes pushed to the UI as they happen
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Appended(ChatMessage),
    RolledBack { id: i64, reason: SendError },
    ActionProposed { kind: ActionKind },
    Connection(ConnectionState),
}

enum SessionCommand {
    Send {
        text: String,
        reply: oneshot::Sender<SendOutcome>,
    },
    LoadHistory {
        reply: oneshot::Sender<Result<HistoryLoad, ApiError>>,
    },
    ResolveAction {
        accept: bool,
        reply: oneshot::Sender<Result<ActionResolution, ApiError>>,
    },
    Shutdown,
}

/// Handle to a running session (cheap to Clone)
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    snapshot: Arc<ArcSwap<SessionSnapshot>>,
    supervisor: SupervisorHandle,
}

impl SessionHandle {
    /// Spawn the coordinator and its reconnection supervisor for one
    /// conversation. Events arrive on the returned receiver until the
    /// session shuts down.
    pub fn spawn<D: Dialer, A: EchoApi>(
        dialer: D,
        api: A,
        config: &Config,
        chat_id: ConversationId,
    ) -> (SessionHandle, mpsc::Receiver<SessionEvent>, JoinHandle<()>) {
        let url = chat_url(&config.ws_url, &chat_id);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let (supervisor, supervisor_task) =
            SupervisorHandle::spawn(dialer, url, RetryPolicy::from(config), inbound_tx);

        let snapshot = Arc::new(ArcSwap::from_pointee(SessionSnapshot {
            chat_id: chat_id.clone(),
            messages: Vec::new(),
            pending_action: None,
        }));

        let (command_tx, command_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(256);

        let session = Session {
            chat_id,
            user_id: config.user_id.clone(),
            messages: Vec::new(),
            pending_action: None,
            last_issued_id: 0,
            snapshot: snapshot.clone(),
            api,
            supervisor: supervisor.clone(),
            event_tx,
            supervisor_task,
        };
        let task = tokio::spawn(session.run(command_rx, inbound_rx));

        (
            SessionHandle {
                command_tx,
                snapshot,
                supervisor,
            },
            event_rx,
            task,
        )
    }

    /// Current session snapshot (lock-free)
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshot.load_full()
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Watch receiver for connection transitions
    pub fn connection_rx(&self) -> watch::Receiver<ConnectionState> {
        self.supervisor.state_rx()
    }

    /// Optimistically send a user message
    pub async fn send(&self, text: impl Into<String>) -> SendOutcome {
        let text = text.into();
        let (reply_tx, reply_rx) = oneshot::channel();
        let fallback = SendOutcome::RolledBack {
            text: text.clone(),
            reason: SendError::Disconnected,
        };
        if self
            .command_tx
            .send(SessionCommand::Send {
                text,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return fallback;
        }
        reply_rx.await.unwrap_or(fallback)
    }

    /// Load persisted history into an empty log
    pub async fn load_history(&self) -> Result<HistoryLoad, ApiError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::LoadHistory { reply: reply_tx })
            .await
            .map_err(|_| ApiError::Network("session closed".into()))?;
        reply_rx
            .await
            .map_err(|_| ApiError::Network("session closed".into()))?
    }

    /// Accept or decline the pending action proposal
    pub async fn resolve_action(&self, accept: bool) -> Result<ActionResolution, ApiError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::ResolveAction {
                accept,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ApiError::Network("session closed".into()))?;
        reply_rx
            .await
            .map_err(|_| ApiError::Network("session closed".into()))?
    }

    /// Ask the supervisor for a fresh connection attempt after a
    /// terminal failure.
    pub async fn reconnect(&self) {
        self.supervisor.reconnect().await;
    }

    /// Close the socket and stop both actor tasks
    pub async fn teardown(self) {
        let _ = self.command_tx.send(SessionCommand::Shutdown).await;
    }
}

struct Session<A: EchoApi> {
    chat_id: ConversationId,
    user_id: String,
    messages: Vec<ChatMessage>,
    pending_action: Option<ActionData>,
    last_issued_id: i64,
    snapshot: Arc<ArcSwap<SessionSnapshot>>,
    api: A,
    supervisor: SupervisorHandle,
    event_tx: mpsc::Sender<SessionEvent>,
    supervisor_task: JoinHandle<()>,
}

enum Step {
    Command(Option<SessionCommand>),
    Inbound(Option<InboundEnvelope>),
    Connection,
}

impl<A: EchoApi> Session<A> {
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<SessionCommand>,
        mut inbound_rx: mpsc::Receiver<InboundEnvelope>,
    ) {
        let mut state_rx = self.supervisor.state_rx();

        loop {
            let step = tokio::select! {
                cmd = command_rx.recv() => Step::Command(cmd),
                envelope = inbound_rx.recv() => Step::Inbound(envelope),
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        Step::Inbound(None)
                    } else {
                        Step::Connection
                    }
                }
            };

            match step {
                Step::Command(Some(SessionCommand::Send { text, reply })) => {
                    let outcome = self.handle_send(text).await;
                    let _ = reply.send(outcome);
                }
                Step::Command(Some(SessionCommand::LoadHistory { reply })) => {
                    let result = self.handle_load_history().await;
                    let _ = reply.send(result);
                }
                Step::Command(Some(SessionCommand::ResolveAction { accept, reply })) => {
                    let result = self.handle_resolve_action(accept).await;
                    let _ = reply.send(result);
                }
                Step::Command(Some(SessionCommand::Shutdown)) | Step::Command(None) => {
                    break;
                }
                Step::Inbound(Some(envelope)) => self.handle_inbound(envelope).await,
                Step::Inbound(None) => break,
                Step::Connection => {
                    let state = state_rx.borrow_and_update().clone();
                    self.emit(SessionEvent::Connection(state)).await;
                }
            }
        }

        info!(
            component = "session",
            event = "session.shutdown",
            chat_id = %self.chat_id,
        );
        self.supervisor.disconnect().await;
        let _ = (&mut self.supervisor_task).await;
    }

    async fn handle_send(&mut self, text: String) -> SendOutcome {
        let id = self.next_message_id();
        let timestamp = now_timestamp();
        let message = ChatMessage {
            id,
            origin: Origin::Local,
            role: Role::User,
            content: text.clone(),
            created_at: timestamp.clone(),
            quotes: Vec::new(),
        };

        // Optimistic append; visible before the frame hits the wire.
        self.messages.push(message.clone());
        self.publish();
        self.emit(SessionEvent::Appended(message)).await;

        let envelope =
            OutboundEnvelope::user(id, self.chat_id.as_str(), &text, timestamp, &self.user_id);
        let frame = match serde_json::to_string(&envelope) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    component = "session",
                    event = "session.send.encode_failed",
                    error = %e,
                );
                return self.rollback(id, text, SendError::SendFailed).await;
            }
        };

        if self.supervisor.send(frame).await {
            debug!(
                component = "session",
                event = "session.send.accepted",
                message_id = id,
            );
            SendOutcome::Sent { id }
        } else {
            let reason = if self.supervisor.is_connected() {
                SendError::SendFailed
            } else {
                SendError::Disconnected
            };
            self.rollback(id, text, reason).await
        }
    }

    async fn rollback(&mut self, id: i64, text: String, reason: SendError) -> SendOutcome {
        self.messages.retain(|m| m.id != id);
        self.publish();
        warn!(
            component = "session",
            event = "session.send.rolled_back",
            message_id = id,
            reason = %reason,
        );
        self.emit(SessionEvent::RolledBack { id, reason }).await;
        SendOutcome::RolledBack { text, reason }
    }

    async fn handle_load_history(&mut self) -> Result<HistoryLoad, ApiError> {
        // A populated log wins over the store: never clobber live messages.
        if !self.messages.is_empty() {
            return Ok(HistoryLoad::SkippedNonEmpty);
        }
        let entries = self.api.fetch_chat_history(self.chat_id.as_str()).await?;
        let count = entries.len();
        self.messages = entries.into_iter().map(|e| e.into_message()).collect();
        if let Some(max_id) = self.messages.iter().map(|m| m.id).max() {
            self.last_issued_id = self.last_issued_id.max(max_id);
        }
        self.publish();
        info!(
            component = "session",
            event = "session.history.loaded",
            chat_id = %self.chat_id,
            messages = count,
        );
        Ok(HistoryLoad::Loaded(count))
    }

    async fn handle_resolve_action(&mut self, accept: bool) -> Result<ActionResolution, ApiError> {
        let Some(action) = self.pending_action.take() else {
            return Err(ApiError::NoPendingAction);
        };
        self.publish();

        if !accept {
            debug!(
                component = "session",
                event = "session.action.declined",
            );
            return Ok(ActionResolution::Declined);
        }

        let payload = action
            .parse_payload()
            .map_err(|e| ApiError::Body(e.to_string()))?;
        let todos: Vec<_> = payload
            .todos
            .into_iter()
            .filter(|t| t.has_valid_id())
            .collect();
        if todos.is_empty() {
            return Err(ApiError::EmptyProposal);
        }

        let count = todos.len();
        for todo in todos {
            match action.kind {
                ActionKind::Add => self.api.save_todo(&todo.todo_id).await?,
                ActionKind::Send => {
                    let message = if todo.todo_desc.is_empty() {
                        todo.todo_name.clone()
                    } else {
                        format!("{}: {}", todo.todo_name, todo.todo_desc)
                    };
                    self.api
                        .send_reminder(&todo.todo_id, &todo.qtalk_id, &message)
                        .await?;
                }
            }
        }
        info!(
            component = "session",
            event = "session.action.committed",
            kind = ?action.kind,
            todos = count,
        );
        Ok(ActionResolution::Committed { todos: count })
    }

    async fn handle_inbound(&mut self, envelope: InboundEnvelope) {
        // A frame for another conversation is stale routing; drop it.
        if let Some(chat_id) = envelope.chat_id() {
            if chat_id != self.chat_id.as_str() {
                debug!(
                    component = "session",
                    event = "session.inbound.wrong_chat",
                    envelope_chat_id = %chat_id,
                    chat_id = %self.chat_id,
                );
                return;
            }
        }

        match envelope {
            InboundEnvelope::Action { data } => {
                let kind = data.kind;
                // A newer proposal supersedes whatever was pending.
                self.pending_action = Some(data);
                self.publish();
                self.emit(SessionEvent::ActionProposed { kind }).await;
            }
            other => {
                let Some(message) = other.into_message() else {
                    return;
                };
                // Inbound messages are purely additive; the log never
                // deduplicates or reorders.
                self.messages.push(message.clone());
                self.publish();
                self.emit(SessionEvent::Appended(message)).await;
            }
        }
    }

    fn publish(&self) {
        self.snapshot.store(Arc::new(SessionSnapshot {
            chat_id: self.chat_id.clone(),
            messages: self.messages.clone(),
            pending_action: self.pending_action.clone(),
        }));
    }

    async fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event).await;
    }

    /// Millis-since-epoch, bumped past the last issued id so rapid sends
    /// never collide.
    fn next_message_id(&mut self) -> i64 {
        let now = now_millis();
        self.last_issued_id = if now > self.last_issued_id {
            now
        } else {
            self.last_issued_id + 1
        };
        self.last_issued_id
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn now_timestamp() -> String {
    now_millis().to_string()
}
