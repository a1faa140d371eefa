//! Kafka record types.
//!
//! A [`Record`] is created by the stream reader on receipt and never mutated
//! afterwards apart from its payload, which is moved to the dispatcher.

use serde_json::Value;

use crate::error::{Error, Result};

/// Identifies the ordering domain of a record.
///
/// Records are delivered in order only within one topic partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub topic: String,
    pub partition: i32,
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.topic, self.partition)
    }
}

/// A decoded Kafka message with metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Deserialized JSON payload, forwarded downstream as-is
    pub payload: Value,
    /// Kafka topic name
    pub topic: String,
    /// Kafka partition number
    pub partition: i32,
    /// Kafka offset within the partition
    pub offset: i64,
    /// Message key (if any)
    pub key: Option<Vec<u8>>,
    /// Message timestamp in milliseconds since epoch (if available)
    pub timestamp: Option<i64>,
}

impl Record {
    /// Build a record from an already decoded payload.
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, payload: Value) -> Self {
        Self {
            payload,
            topic: topic.into(),
            partition,
            offset,
            key: None,
            timestamp: None,
        }
    }

    /// Decode the raw bytes of a Kafka message value as JSON.
    ///
    /// A missing value (tombstone) and malformed JSON are both errors; the
    /// caller decides whether to skip the record.
    pub fn decode(
        topic: &str,
        partition: i32,
        offset: i64,
        key: Option<&[u8]>,
        timestamp: Option<i64>,
        value: Option<&[u8]>,
    ) -> Result<Self> {
        let bytes = value.ok_or_else(|| Error::EmptyPayload {
            topic: topic.to_string(),
            partition,
            offset,
        })?;

        let payload = serde_json::from_slice(bytes).map_err(|source| Error::InvalidJson {
            topic: topic.to_string(),
            partition,
            offset,
            source,
        })?;

        Ok(Self {
            payload,
            topic: topic.to_string(),
            partition,
            offset,
            key: key.map(|k| k.to_vec()),
            timestamp,
        })
    }

    /// Attach a message key.
    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// The position used to acknowledge this record.
    pub fn position(&self) -> i64 {
        self.offset
    }

    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey {
            topic: self.topic.clone(),
            partition: self.partition,
        }
    }

    /// The application's `data.text` field, if the payload has one.
    pub fn text(&self) -> Option<&str> {
        self.payload.get("data")?.get("text")?.as_str()
    }
}
