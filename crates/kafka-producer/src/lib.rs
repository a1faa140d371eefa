//! Kafka producer library for testing kafka-http-bridge
//!
//! This library publishes JSON-encoded chat messages so that the bridge can be
//! exercised end to end against a real broker.
//!
//! ## Features
//!
//! - **JSON encoding**: any `serde::Serialize` value becomes the record value
//! - **Kafka producer**: helper struct for publishing test messages to Kafka topics
//! - **Topic management**: utilities for creating topics on a test broker
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kafka_producer::{ChatMessage, KafkaTestProducer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let producer = KafkaTestProducer::new("localhost:9092").await?;
//!     producer.create_topic_if_not_exists("chat-messages", 3).await?;
//!
//!     let message = ChatMessage::new("chat_001", "alice", "hello");
//!     producer.publish_json("chat-messages", Some("chat_001"), &message).await?;
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use serde::Serialize;
use std::time::Duration;

// Test data helpers module
pub mod testdata;

pub use testdata::{publish_test_messages, sample_chat_messages, ChatData, ChatMessage};

/// Kafka producer wrapper for testing
pub struct KafkaTestProducer {
    producer: FutureProducer,
    broker: String,
}

impl KafkaTestProducer {
    /// Create a new Kafka test producer
    pub async fn new(broker: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", broker)
            .set("message.timeout.ms", "5000")
            .create()
            .context("Failed to create Kafka producer")?;

        Ok(Self {
            producer,
            broker: broker.to_string(),
        })
    }

    /// Create Kafka topic if it doesn't exist
    pub async fn create_topic_if_not_exists(&self, topic: &str, partitions: i32) -> Result<()> {
        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.broker)
            .create()
            .context("Failed to create admin client")?;

        let new_topic = NewTopic::new(topic, partitions, TopicReplication::Fixed(1));
        let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(5)));

        let results = admin_client
            .create_topics(&[new_topic], &opts)
            .await
            .context("Failed to create topics")?;

        for result in results {
            match result {
                Ok(topic_name) => {
                    tracing::info!("Topic '{topic_name}' created successfully");
                }
                Err((topic_name, err)) => {
                    if err.to_string().contains("already exists") {
                        tracing::info!("Topic '{topic_name}' already exists");
                    } else {
                        return Err(anyhow::anyhow!("Failed to create topic: {err}"));
                    }
                }
            }
        }

        Ok(())
    }

    /// Publish a JSON-encoded value to Kafka
    pub async fn publish_json<T: Serialize>(
        &self,
        topic: &str,
        key: Option<&str>,
        value: &T,
    ) -> Result<()> {
        let payload = serde_json::to_vec(value).context("Failed to encode message as JSON")?;

        let mut record = FutureRecord::<str, _>::to(topic).payload(&payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(err, _)| err)
            .context("Failed to send message to Kafka")?;

        tracing::debug!("Published {} bytes to {topic}", payload.len());
        Ok(())
    }

    /// Publish raw bytes, e.g. to exercise the bridge's handling of bad payloads
    pub async fn publish_raw(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let record = FutureRecord::<str, _>::to(topic).payload(payload);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(err, _)| err)
            .context("Failed to send message to Kafka")?;

        Ok(())
    }

    pub fn broker(&self) -> &str {
        &self.broker
    }
}
