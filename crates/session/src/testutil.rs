//! Scripted transport and backend fakes shared across the crate's tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use echo_protocol::HistoryEntry;

use crate::api::EchoApi;
use crate::error::{ApiError, TransportError};
use crate::transport::{Conn, Dialer};

enum Frame {
    Text(String),
    Close,
}

enum DialOutcome {
    Failure,
    Conn(ScriptedConn),
}

/// Ordered dial outcomes for a `ScriptedDialer`. Once the script is
/// exhausted every further dial fails.
pub struct DialScript {
    outcomes: VecDeque<DialOutcome>,
}

impl DialScript {
    pub fn new() -> Self {
        Self {
            outcomes: VecDeque::new(),
        }
    }

    /// Every dial fails, from the first one on.
    pub fn always_fail() -> Self {
        Self::new()
    }

    pub fn push_failure(&mut self) {
        self.outcomes.push_back(DialOutcome::Failure);
    }

    /// Queue a successful dial; the returned handle drives the connection
    /// from the "server" side.
    pub fn push_conn(&mut self) -> ConnHandle {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ConnShared {
            sent: Mutex::new(Vec::new()),
            accept_sends: AtomicBool::new(true),
        });
        let handle = ConnHandle {
            frame_tx,
            shared: shared.clone(),
        };
        self.outcomes
            .push_back(DialOutcome::Conn(ScriptedConn { frame_rx, shared }));
        handle
    }
}

/// Build a dialer from a script; the counter tracks total dial attempts.
pub fn scripted(script: DialScript) -> (ScriptedDialer, Arc<AtomicU32>) {
    let dials = Arc::new(AtomicU32::new(0));
    (
        ScriptedDialer {
            outcomes: Mutex::new(script.outcomes),
            dials: dials.clone(),
        },
        dials,
    )
}

pub struct ScriptedDialer {
    outcomes: Mutex<VecDeque<DialOutcome>>,
    dials: Arc<AtomicU32>,
}

impl Dialer for ScriptedDialer {
    type Conn = ScriptedConn;

    async fn dial(&self, _url: &str) -> Result<ScriptedConn, TransportError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let outcome = self.outcomes.lock().unwrap().pop_front();
        match outcome {
            Some(DialOutcome::Conn(conn)) => Ok(conn),
            Some(DialOutcome::Failure) | None => {
                Err(TransportError::Connect("scripted refusal".into()))
            }
        }
    }
}

struct ConnShared {
    sent: Mutex<Vec<String>>,
    accept_sends: AtomicBool,
}

pub struct ScriptedConn {
    frame_rx: mpsc::UnboundedReceiver<Frame>,
    shared: Arc<ConnShared>,
}

impl Conn for ScriptedConn {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if !self.shared.accept_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("scripted rejection".into()));
        }
        self.shared.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        match self.frame_rx.recv().await? {
            Frame::Text(text) => Some(Ok(text)),
            Frame::Close => None,
        }
    }

    async fn close(&mut self) {
        self.frame_rx.close();
    }
}

/// Server-side control of a scripted connection
#[derive(Clone)]
pub struct ConnHandle {
    frame_tx: mpsc::UnboundedSender<Frame>,
    shared: Arc<ConnShared>,
}

impl ConnHandle {
    pub fn push_text(&self, raw: &str) {
        let _ = self.frame_tx.send(Frame::Text(raw.to_string()));
    }

    pub fn close_from_server(&self) {
        let _ = self.frame_tx.send(Frame::Close);
    }

    /// Frames the client wrote so far
    pub fn sent(&self) -> Vec<String> {
        self.shared.sent.lock().unwrap().clone()
    }

    pub fn set_accept_sends(&self, accept: bool) {
        self.shared.accept_sends.store(accept, Ordering::SeqCst);
    }
}

/// In-memory backend double
#[derive(Clone, Default)]
pub struct FakeApi {
    inner: Arc<FakeApiInner>,
}

#[derive(Default)]
struct FakeApiInner {
    history: Mutex<Vec<HistoryEntry>>,
    fail_history: AtomicBool,
    saved_todos: Mutex<Vec<String>>,
    reminders: Mutex<Vec<(String, String, String)>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_history(&self, entries: Vec<HistoryEntry>) {
        *self.inner.history.lock().unwrap() = entries;
    }

    pub fn fail_history(&self, fail: bool) {
        self.inner.fail_history.store(fail, Ordering::SeqCst);
    }

    pub fn saved_todos(&self) -> Vec<String> {
        self.inner.saved_todos.lock().unwrap().clone()
    }

    pub fn reminders(&self) -> Vec<(String, String, String)> {
        self.inner.reminders.lock().unwrap().clone()
    }
}

impl EchoApi for FakeApi {
    async fn fetch_chat_history(&self, _chat_id: &str) -> Result<Vec<HistoryEntry>, ApiError> {
        if self.inner.fail_history.load(Ordering::SeqCst) {
            return Err(ApiError::NotFound);
        }
        Ok(self.inner.history.lock().unwrap().clone())
    }

    async fn save_todo(&self, todo_id: &str) -> Result<(), ApiError> {
        self.inner
            .saved_todos
            .lock()
            .unwrap()
            .push(todo_id.to_string());
        Ok(())
    }

    async fn remove_todo(&self, _todo_id: &str) -> Result<(), ApiError> {
        Ok(())
    }

    async fn send_reminder(
        &self,
        todo_id: &str,
        group_id: &str,
        message: &str,
    ) -> Result<(), ApiError> {
        self.inner.reminders.lock().unwrap().push((
            todo_id.to_string(),
            group_id.to_string(),
            message.to_string(),
        ));
        Ok(())
    }
}
