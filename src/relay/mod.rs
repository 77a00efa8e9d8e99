//! The `relay` module fans broker messages out to live viewers.
//!
//! It owns the live-connection registry and a bounded replay buffer per
//! topic. Viewers receive a snapshot from the buffer when they subscribe and
//! every later message for their topic incrementally.

pub mod buffer;
pub mod engine;
pub mod message;

pub use buffer::ReplayBuffer;
pub use engine::Relay;
pub use message::Message;

#[cfg(test)]
mod tests;
