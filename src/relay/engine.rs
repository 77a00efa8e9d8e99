//! Relay engine
//!
//! Shared state:
//! - `buffers`: topic -> `ReplayBuffer`, one lock for the whole map. Both
//!   `deliver` and `subscribe` run under it, which keeps every subscriber's
//!   view of a topic gap-free and duplicate-free across the snapshot/live
//!   boundary.
//! - `connections`: the live registry. Fan-out clones a snapshot of it under a
//!   short read lock and never holds the registry lock while sending.
//!
//! Sends never wait: each connection has a bounded queue and a frame that does
//! not fit is dropped for that connection only.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use super::{Message, ReplayBuffer};
use crate::auth::TokenVerifier;
use crate::connection::{Connection, ConnectionId};
use crate::transport::message::Batch;

pub struct Relay {
    buffers: Mutex<HashMap<String, ReplayBuffer>>,
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    max_messages: usize,
    verifier: Arc<dyn TokenVerifier>,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("max_messages", &self.max_messages)
            .field("connections", &self.connection_count())
            .finish()
    }
}

impl Relay {
    /// `max_messages` bounds every topic's replay buffer.
    pub fn new(max_messages: usize, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            max_messages: max_messages.max(1),
            verifier,
        }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Creates a connection around `sender` and adds it to the registry.
    pub fn register_connection(&self, sender: Sender<WsMessage>) -> Arc<Connection> {
        let connection = Arc::new(Connection::new(sender));
        self.connections
            .write()
            .insert(connection.id().to_string(), connection.clone());
        debug!(connection = %connection.id(), "connection registered");
        connection
    }

    /// Verifies `token` in the background and authorizes `connection` on
    /// success. Failures are logged only; the peer is told nothing.
    pub fn handle_credential(&self, connection: &Arc<Connection>, token: String) -> JoinHandle<()> {
        let verifier = self.verifier.clone();
        let connection = connection.clone();

        tokio::spawn(async move {
            match verifier.verify(&token).await {
                Ok(true) => {
                    if connection.authorize() {
                        info!(connection = %connection.id(), "connection authorized");
                    } else {
                        debug!(connection = %connection.id(), "connection closed before verification finished");
                    }
                }
                Ok(false) => {
                    warn!(connection = %connection.id(), "token lacks a permitted role");
                }
                Err(e) => {
                    warn!(connection = %connection.id(), "token verification failed: {e}");
                }
            }
        })
    }

    /// Binds `connection` to `topic` and, if it is authorized, sends the last
    /// `count` buffered messages as one snapshot batch. Returns the number of
    /// messages sent.
    pub fn subscribe(&self, connection: &Connection, topic: &str, count: usize) -> usize {
        let buffers = self.buffers.lock();

        if !connection.bind_topic(topic) {
            debug!(connection = %connection.id(), topic, "subscribe accepted without data");
            return 0;
        }

        let messages = buffers
            .get(topic)
            .map(|buffer| buffer.last_n(count))
            .unwrap_or_default();
        let batch = Batch::snapshot(topic, messages.iter().map(|m| m.as_ref()));

        let frame = match batch.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!(topic, "failed to serialize snapshot: {e}");
                return 0;
            }
        };

        match connection.send(frame) {
            Ok(()) => {
                debug!(connection = %connection.id(), topic, count = messages.len(), "snapshot sent");
                messages.len()
            }
            Err(e) => {
                warn!(connection = %connection.id(), topic, "failed to send snapshot: {e}");
                0
            }
        }
    }

    /// Appends `message` to its topic's buffer and pushes it to every
    /// authorized connection bound to that topic. Returns the number of
    /// connections it was queued for.
    pub fn deliver(&self, message: Message) -> usize {
        let message = Arc::new(message);
        let topic = message.topic.clone();

        let frame = match Batch::incremental(&message).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!(topic = %topic, "failed to serialize message: {e}");
                return 0;
            }
        };

        let mut buffers = self.buffers.lock();
        buffers
            .entry(topic.clone())
            .or_insert_with(|| ReplayBuffer::new(self.max_messages))
            .push(message);

        let targets: Vec<Arc<Connection>> = self.connections.read().values().cloned().collect();

        let mut delivered = 0;
        for connection in targets {
            match connection.deliver(&topic, frame.clone()) {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(connection = %connection.id(), topic = %topic, "failed to deliver message: {e}");
                }
            }
        }
        delivered
    }

    /// Idempotent: only the first call for a connection removes it and
    /// releases its channel.
    pub fn unregister(&self, connection: &Connection) {
        if !connection.terminate() {
            return;
        }
        self.connections.write().remove(connection.id());
        debug!(connection = %connection.id(), "connection unregistered");
    }

    /// Unregisters every live connection.
    pub fn shutdown(&self) {
        let authorized = self.authorized_count();
        let connections: Vec<Arc<Connection>> =
            self.connections.read().values().cloned().collect();
        for connection in &connections {
            self.unregister(connection);
        }
        info!(closed = connections.len(), authorized, "relay shut down");
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn authorized_count(&self) -> usize {
        self.connections
            .read()
            .values()
            .filter(|connection| connection.is_authorized())
            .count()
    }

    /// Buffer contents for `topic`, oldest first.
    pub fn buffered(&self, topic: &str) -> Vec<Arc<Message>> {
        self.buffers
            .lock()
            .get(topic)
            .map(|buffer| buffer.last_n(buffer.len()))
            .unwrap_or_default()
    }
}
