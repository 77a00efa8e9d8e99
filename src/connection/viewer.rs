//! Connection record
//!
//! All mutable state of a connection lives behind one lock so that credential
//! verification, topic binding, delivery and teardown observe each other
//! consistently. `terminate` is a check-and-set: the first caller drops the
//! sender, every later call is a no-op.

use parking_lot::Mutex;
use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::TrySendError;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::utils::error::SendError;

pub type ConnectionId = String;

#[derive(Debug)]
struct State {
    sender: Option<Sender<WsMessage>>,
    authorized: bool,
    topic: Option<String>,
    terminated: bool,
}

#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    state: Mutex<State>,
}

impl Connection {
    /// Create an unauthorized, unbound connection around `sender`.
    pub fn new(sender: Sender<WsMessage>) -> Self {
        Self {
            id: format!("conn-{}", Uuid::new_v4()),
            state: Mutex::new(State {
                sender: Some(sender),
                authorized: false,
                topic: None,
                terminated: false,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_authorized(&self) -> bool {
        self.state.lock().authorized
    }

    pub fn topic(&self) -> Option<String> {
        self.state.lock().topic.clone()
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    /// Marks the connection authorized. Returns false when it was already
    /// terminated, in which case nothing changes.
    pub fn authorize(&self) -> bool {
        let mut state = self.state.lock();
        if state.terminated {
            return false;
        }
        state.authorized = true;
        true
    }

    /// Replaces the bound topic and reports whether the connection may
    /// receive data right now.
    pub fn bind_topic(&self, topic: &str) -> bool {
        let mut state = self.state.lock();
        if state.terminated {
            return false;
        }
        state.topic = Some(topic.to_string());
        state.authorized
    }

    /// Queue `frame` without waiting.
    pub fn send(&self, frame: WsMessage) -> Result<(), SendError> {
        let state = self.state.lock();
        Self::push(&state, frame)
    }

    /// Queue `frame` only if the connection is authorized and bound to
    /// `topic`. Returns whether the connection was a target.
    pub fn deliver(&self, topic: &str, frame: WsMessage) -> Result<bool, SendError> {
        let state = self.state.lock();
        if state.terminated || !state.authorized || state.topic.as_deref() != Some(topic) {
            return Ok(false);
        }
        Self::push(&state, frame).map(|_| true)
    }

    /// Returns true for the call that actually terminated the connection.
    pub fn terminate(&self) -> bool {
        let mut state = self.state.lock();
        if state.terminated {
            return false;
        }
        state.terminated = true;
        state.authorized = false;
        state.sender.take();
        true
    }

    fn push(state: &State, frame: WsMessage) -> Result<(), SendError> {
        let sender = match (&state.sender, state.terminated) {
            (Some(sender), false) => sender,
            _ => return Err(SendError::Terminated),
        };
        sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }
}
