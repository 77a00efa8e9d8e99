//! The `transport` module handles the viewer-facing WebSocket channel.
//!
//! It defines the frames exchanged with viewers and implements the server
//! loop that registers each connection with the relay and forwards its
//! requests.

pub mod message;
pub mod websocket;

pub use message::{Batch, ClientMessage, SubscribeRequest};
pub use websocket::{handle_client_text, serve_websocket, start_websocket_server};
