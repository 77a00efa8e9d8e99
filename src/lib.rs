//! # datastream
//!
//! `datastream` lets operators watch and inject messages on the topics of a
//! backing publish/subscribe broker. Broker topics are consumed continuously,
//! the most recent messages per topic are kept in memory, and live viewers
//! receive them over WebSockets.
//!
//! ## Core Modules
//!
//! - `relay`: per-topic replay buffers and fan-out to live viewers.
//! - `connection`: one viewer's channel, authorization flag and bound topic.
//! - `ingest`: topic discovery, one consumer per topic, publishing.
//! - `broker`: the boundary to the backing broker, with an in-process implementation.
//! - `auth`: the token authorizer consulted before data is sent.
//! - `transport`: the WebSocket protocol and server.
//! - `http`: the administrative REST surface.
//! - `config`: loading and merging server configuration.
//! - `utils`: error types and logging.

pub mod auth;
pub mod broker;
pub mod config;
pub mod connection;
pub mod http;
pub mod ingest;
pub mod relay;
pub mod transport;
pub mod utils;
