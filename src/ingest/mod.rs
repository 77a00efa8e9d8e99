//! The `ingest` module owns consumption from the backing broker.
//!
//! It discovers topics, starts one consumer per externally visible topic the
//! first time it is seen, hands every consumed record to the relay and then
//! commits it. It also publishes single messages on behalf of operators.

pub mod service;

pub use service::Ingestion;
