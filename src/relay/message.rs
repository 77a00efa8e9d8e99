use serde::{Deserialize, Serialize};

use crate::broker::Record;

/// A broker message as held by the relay.
///
/// `payload` is the raw record value decoded as UTF-8; viewers usually parse
/// it as JSON. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: i64,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            partition: 0,
            offset,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

impl From<Record> for Message {
    fn from(record: Record) -> Self {
        Self {
            payload: String::from_utf8_lossy(&record.value).into_owned(),
            topic: record.topic,
            partition: record.partition,
            offset: record.offset,
            timestamp: record.timestamp,
        }
    }
}
