//! The `connection` module defines one live viewer channel as seen by the relay.
//!
//! A `Connection` holds the sending side of a bounded per-connection queue
//! drained by the transport's writer task, plus the viewer's authorization
//! flag and bound topic.

pub mod viewer;

pub use viewer::{Connection, ConnectionId};
