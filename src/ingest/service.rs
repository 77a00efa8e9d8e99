use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broker::{BrokerClient, StartOffset, TopicConsumer};
use crate::relay::{Message, Relay};
use crate::utils::error::{BrokerError, IngestError};

/// Ingestion component. Consumers, once started, run for the life of the
/// process.
pub struct Ingestion {
    client: Arc<dyn BrokerClient>,
    relay: Arc<Relay>,
    internal_prefix: String,
    consumers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl std::fmt::Debug for Ingestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestion")
            .field("internal_prefix", &self.internal_prefix)
            .finish_non_exhaustive()
    }
}

impl Ingestion {
    pub fn new(
        client: Arc<dyn BrokerClient>,
        relay: Arc<Relay>,
        internal_prefix: impl Into<String>,
    ) -> Self {
        Self {
            client,
            relay,
            internal_prefix: internal_prefix.into(),
            consumers: Mutex::new(HashMap::new()),
        }
    }

    /// Externally visible topics, sorted. Starts a consumer for each one not
    /// yet consumed. A consumer that fails to start does not stop the others;
    /// the failed topics are reported once every topic has been attempted.
    pub async fn list_topics(&self) -> Result<Vec<String>, IngestError> {
        let mut topics: Vec<String> = self
            .client
            .topics()
            .await?
            .into_iter()
            .filter(|topic| !self.is_internal(topic))
            .collect();
        topics.sort();
        topics.dedup();

        let mut failed = Vec::new();
        for topic in &topics {
            if let Err(e) = self.start_consumer(topic).await {
                error!(topic = %topic, "failed to start consumer: {e}");
                failed.push(topic.clone());
            }
        }

        if failed.is_empty() {
            Ok(topics)
        } else {
            Err(IngestError::ConsumerStart { topics: failed })
        }
    }

    /// Starts consuming `topic` from the latest position. Returns false when a
    /// consumer already exists.
    pub async fn start_consumer(&self, topic: &str) -> Result<bool, BrokerError> {
        let mut consumers = self.consumers.lock().await;
        if consumers.contains_key(topic) {
            return Ok(false);
        }

        let consumer = self.client.consumer(topic, StartOffset::Latest).await?;
        let handle = tokio::spawn(run_consumer(
            topic.to_string(),
            consumer,
            self.relay.clone(),
        ));
        consumers.insert(topic.to_string(), handle);
        info!(topic, "consumer started");
        Ok(true)
    }

    /// Sends one message to `topic`. Succeeds once the producer has accepted it.
    pub async fn publish(&self, topic: &str, message: &str) -> Result<(), BrokerError> {
        let mut producer = self.client.producer();
        producer.init().await?;
        producer.send(topic, message.as_bytes()).await?;
        debug!(topic, "message published");
        Ok(())
    }

    pub async fn is_consuming(&self, topic: &str) -> bool {
        self.consumers.lock().await.contains_key(topic)
    }

    pub async fn consumer_count(&self) -> usize {
        self.consumers.lock().await.len()
    }

    fn is_internal(&self, topic: &str) -> bool {
        !self.internal_prefix.is_empty() && topic.starts_with(&self.internal_prefix)
    }
}

/// Hands each record to the relay, then commits it.
async fn run_consumer(topic: String, mut consumer: Box<dyn TopicConsumer>, relay: Arc<Relay>) {
    while let Some(next) = consumer.next().await {
        let record = match next {
            Ok(record) => record,
            Err(e) => {
                error!(topic = %topic, "consumer error: {e}");
                continue;
            }
        };

        let (partition, offset) = (record.partition, record.offset);
        let message = Message::from(record);
        info!(
            topic = %topic,
            partition,
            offset,
            "handle broker message: {}",
            message.payload
        );
        relay.deliver(message);

        if let Err(e) = consumer.commit(partition, offset).await {
            warn!(topic = %topic, offset, "failed to commit offset: {e}");
        }
    }
    info!(topic = %topic, "consumer stream ended");
}
