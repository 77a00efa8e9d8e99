//! Error types shared by the relay, ingestion, auth and transport layers.
//!
//! Transport and protocol errors are recovered where they happen (logged, the
//! affected connection or frame is dropped). Broker errors surface to the caller
//! of the operation that triggered them.

use thiserror::Error;

/// Errors reported by the backing broker client.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Could not reach the broker or the connection settings are unusable
    #[error("broker connection failed: {0}")]
    Connection(String),

    /// Producer used before `init`
    #[error("producer is not initialized")]
    NotReady,

    /// Consumer could not be started or its stream failed
    #[error("consumer error on topic {topic}: {reason}")]
    Consumer { topic: String, reason: String },

    /// Producer send was rejected
    #[error("producer error on topic {topic}: {reason}")]
    Producer { topic: String, reason: String },

    /// The client has been shut down
    #[error("broker client closed")]
    Closed,
}

/// Errors raised by the ingestion component.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// One or more consumers could not be started; the rest of the listing went ahead
    #[error("failed to start consumers for: {}", topics.join(", "))]
    ConsumerStart { topics: Vec<String> },
}

/// Errors raised while verifying or minting credentials.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    Token(#[source] jsonwebtoken::errors::Error),

    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("token expiry {0} is before the epoch")]
    Expiry(i64),
}

/// A single inbound frame that could not be understood.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("credential is empty")]
    EmptyCredential,

    #[error("topic is empty")]
    EmptyTopic,

    #[error("malformed request: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-connection send failures. Never fatal to the relay.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SendError {
    /// The connection's outbound queue is full; the frame was dropped
    #[error("send queue full")]
    Full,

    /// The writer side has gone away
    #[error("send queue closed")]
    Closed,

    /// The connection was already unregistered
    #[error("connection terminated")]
    Terminated,
}
