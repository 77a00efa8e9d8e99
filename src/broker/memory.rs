//! In-process broker
//!
//! Keeps a bounded log per topic and fans new records out to live consumers
//! through a bounded `broadcast` channel. Once a log holds `retention` records
//! the oldest is dropped; offsets keep counting up. A consumer that falls more
//! than the channel capacity behind skips the lost records and logs how many.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::{BrokerClient, Record, StartOffset, TopicConsumer, TopicProducer};
use crate::config::BrokerSettings;
use crate::utils::error::BrokerError;

const CHANNEL_CAPACITY: usize = 4096;

/// Records kept per topic when no retention is configured.
pub const DEFAULT_RETENTION: usize = 10_000;

#[derive(Debug)]
struct TopicLog {
    records: VecDeque<Record>,
    next_offset: i64,
    committed: Option<i64>,
    tx: broadcast::Sender<Record>,
}

impl TopicLog {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            records: VecDeque::new(),
            next_offset: 0,
            committed: None,
            tx,
        }
    }
}

#[derive(Debug)]
struct Inner {
    url: String,
    retention: usize,
    topics: RwLock<HashMap<String, TopicLog>>,
}

impl Inner {
    fn append(&self, topic: &str, value: &[u8]) -> Record {
        let mut topics = self.topics.write();
        let log = topics
            .entry(topic.to_string())
            .or_insert_with(TopicLog::new);
        let record = Record {
            topic: topic.to_string(),
            partition: 0,
            offset: log.next_offset,
            value: value.to_vec(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        log.next_offset += 1;
        if log.records.len() >= self.retention {
            log.records.pop_front();
        }
        log.records.push_back(record.clone());
        // no live consumers is fine
        let _ = log.tx.send(record.clone());
        record
    }
}

/// Broker held entirely in this process.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_retention(url, DEFAULT_RETENTION)
    }

    /// Keeps at most `retention` records per topic (at least one).
    pub fn with_retention(url: impl Into<String>, retention: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                retention: retention.max(1),
                topics: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn from_settings(settings: &BrokerSettings) -> Self {
        Self::with_retention(settings.url.clone(), settings.retained_records)
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Creates `topic` if it does not exist yet.
    pub fn create_topic(&self, topic: &str) {
        self.inner
            .topics
            .write()
            .entry(topic.to_string())
            .or_insert_with(TopicLog::new);
    }

    /// Appends a record directly, bypassing the producer handshake.
    pub fn append(&self, topic: &str, value: &[u8]) -> Record {
        self.inner.append(topic, value)
    }

    /// Records currently retained for `topic`, oldest first.
    pub fn records(&self, topic: &str) -> Vec<Record> {
        self.inner
            .topics
            .read()
            .get(topic)
            .map(|log| log.records.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn committed_offset(&self, topic: &str) -> Option<i64> {
        self.inner
            .topics
            .read()
            .get(topic)
            .and_then(|log| log.committed)
    }
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    async fn topics(&self) -> Result<Vec<String>, BrokerError> {
        Ok(self.inner.topics.read().keys().cloned().collect())
    }

    async fn consumer(
        &self,
        topic: &str,
        start: StartOffset,
    ) -> Result<Box<dyn TopicConsumer>, BrokerError> {
        let mut topics = self.inner.topics.write();
        let log = topics
            .get_mut(topic)
            .ok_or_else(|| BrokerError::Consumer {
                topic: topic.to_string(),
                reason: "unknown topic".to_string(),
            })?;

        // Backlog and subscription are taken under the same lock so no record
        // falls between them.
        let backlog = match start {
            StartOffset::Latest => VecDeque::new(),
            StartOffset::Earliest => log.records.iter().cloned().collect(),
        };
        let rx = log.tx.subscribe();
        debug!(topic, ?start, "memory consumer opened");

        Ok(Box::new(MemoryConsumer {
            topic: topic.to_string(),
            inner: self.inner.clone(),
            backlog,
            rx,
        }))
    }

    fn producer(&self) -> Box<dyn TopicProducer> {
        Box::new(MemoryProducer {
            inner: self.inner.clone(),
            ready: false,
        })
    }
}

struct MemoryConsumer {
    topic: String,
    inner: Arc<Inner>,
    backlog: VecDeque<Record>,
    rx: broadcast::Receiver<Record>,
}

#[async_trait]
impl TopicConsumer for MemoryConsumer {
    async fn next(&mut self) -> Option<Result<Record, BrokerError>> {
        if let Some(record) = self.backlog.pop_front() {
            return Some(Ok(record));
        }
        loop {
            match self.rx.recv().await {
                Ok(record) => return Some(Ok(record)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "memory consumer lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    async fn commit(&mut self, _partition: i32, offset: i64) -> Result<(), BrokerError> {
        let mut topics = self.inner.topics.write();
        let log = topics.get_mut(&self.topic).ok_or(BrokerError::Closed)?;
        log.committed = Some(offset);
        Ok(())
    }
}

struct MemoryProducer {
    inner: Arc<Inner>,
    ready: bool,
}

#[async_trait]
impl TopicProducer for MemoryProducer {
    async fn init(&mut self) -> Result<(), BrokerError> {
        if self.inner.url.trim().is_empty() {
            return Err(BrokerError::Connection(
                "no connection string configured".to_string(),
            ));
        }
        self.ready = true;
        Ok(())
    }

    async fn send(&mut self, topic: &str, value: &[u8]) -> Result<(), BrokerError> {
        if !self.ready {
            return Err(BrokerError::NotReady);
        }
        if topic.is_empty() {
            return Err(BrokerError::Producer {
                topic: topic.to_string(),
                reason: "empty topic name".to_string(),
            });
        }
        let record = self.inner.append(topic, value);
        debug!(topic, offset = record.offset, "memory producer accepted record");
        Ok(())
    }
}
