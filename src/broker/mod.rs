//! The `broker` module is the boundary to the backing publish/subscribe broker.
//!
//! Ingestion is written against the `BrokerClient`, `TopicConsumer` and
//! `TopicProducer` traits only. `MemoryBroker` is an in-process implementation
//! with one partition per topic.

pub mod memory;

use async_trait::async_trait;

use crate::utils::error::BrokerError;

pub use memory::MemoryBroker;

/// A record as read from the broker log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub value: Vec<u8>,
    /// Milliseconds since the Unix epoch at which the broker accepted the record.
    pub timestamp: i64,
}

/// Where a new consumer starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    /// Only records produced after the consumer was created.
    Latest,
    /// The whole retained log, then live records.
    Earliest,
}

/// Connection to the backing broker.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// All topic names in broker metadata, internal ones included.
    async fn topics(&self) -> Result<Vec<String>, BrokerError>;

    /// Opens a consumer bound to `topic`.
    async fn consumer(
        &self,
        topic: &str,
        start: StartOffset,
    ) -> Result<Box<dyn TopicConsumer>, BrokerError>;

    /// Creates an uninitialised producer.
    fn producer(&self) -> Box<dyn TopicProducer>;
}

/// Reader cursor bound to one topic.
#[async_trait]
pub trait TopicConsumer: Send {
    /// Next record, or `None` once the stream has ended.
    async fn next(&mut self) -> Option<Result<Record, BrokerError>>;

    /// Records `offset` as processed for `partition`.
    async fn commit(&mut self, partition: i32, offset: i64) -> Result<(), BrokerError>;
}

/// Writer for single records.
#[async_trait]
pub trait TopicProducer: Send {
    async fn init(&mut self) -> Result<(), BrokerError>;

    /// Accepts one record for `topic`. Returns once the broker has taken it.
    async fn send(&mut self, topic: &str, value: &[u8]) -> Result<(), BrokerError>;
}
