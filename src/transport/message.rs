use serde::{Deserialize, Serialize};
use tungstenite::protocol::Message as WsMessage;

use crate::relay::Message;
use crate::utils::error::ProtocolError;

/// Prefix of the credential handshake frame.
pub const TOKEN_PREFIX: &str = "token:";

/// A subscribe/fetch request: bind to `topic` and replay the last `count` messages.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub topic: String,
    pub count: usize,
}

/// Frames accepted from a viewer.
#[derive(Debug, PartialEq, Eq)]
pub enum ClientMessage {
    Credential(String),
    Subscribe(SubscribeRequest),
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        if let Some(token) = text.strip_prefix(TOKEN_PREFIX) {
            if token.is_empty() {
                return Err(ProtocolError::EmptyCredential);
            }
            return Ok(ClientMessage::Credential(token.to_string()));
        }

        let request: SubscribeRequest = serde_json::from_str(text)?;
        if request.topic.is_empty() {
            return Err(ProtocolError::EmptyTopic);
        }
        Ok(ClientMessage::Subscribe(request))
    }
}

/// Frame sent to a viewer. `full` batches are replay snapshots; the others
/// carry a single live message.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Batch {
    pub full: bool,
    pub topic: String,
    pub messages: Vec<String>,
}

impl Batch {
    /// Snapshot batch, `messages` oldest first.
    pub fn snapshot<'a, I>(topic: &str, messages: I) -> Self
    where
        I: IntoIterator<Item = &'a Message>,
    {
        Self {
            full: true,
            topic: topic.to_string(),
            messages: messages.into_iter().map(|m| m.payload.clone()).collect(),
        }
    }

    pub fn incremental(message: &Message) -> Self {
        Self {
            full: false,
            topic: message.topic.clone(),
            messages: vec![message.payload.clone()],
        }
    }

    pub fn to_frame(&self) -> Result<WsMessage, serde_json::Error> {
        Ok(WsMessage::text(serde_json::to_string(self)?))
    }
}
