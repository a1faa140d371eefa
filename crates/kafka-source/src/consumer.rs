use crate::error::{Error, Result};
use crate::source::RecordSource;
use async_trait::async_trait;
use kafka_types::Record;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{
    CommitMode, Consumer as RdkafkaConsumer, StreamConsumer as RdkafkaStreamConsumer,
};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage as RdkafkaBorrowedMessage, Message as RdkafkaMessage};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where to start when the consumer group has no committed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OffsetReset {
    /// Start from the oldest retained record
    #[default]
    Earliest,
    /// Start from records produced after the subscription
    Latest,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

/// Configuration for the Kafka consumer
#[derive(Clone)]
pub struct ConsumerConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// Consumer group ID
    pub group_id: String,
    /// Topic to consume from
    pub topic: String,
    /// Optional client id reported to the brokers
    pub client_id: Option<String>,
    /// Security protocol ("SASL_SSL", "SASL_PLAINTEXT", "SSL" or "PLAINTEXT")
    pub security_protocol: String,
    /// SASL mechanism ("PLAIN", "SCRAM-SHA-256", "SCRAM-SHA-512")
    pub sasl_mechanism: String,
    /// SASL username
    pub sasl_username: Option<String>,
    /// SASL password
    pub sasl_password: Option<String>,
    /// Auto offset reset strategy
    ///
    /// "earliest" means the consumer starts from the beginning of the topic
    /// if no committed offsets are found for the consumer group.
    pub auto_offset_reset: OffsetReset,
    /// Session timeout in milliseconds
    pub session_timeout_ms: u32,
    /// How often stored positions are committed in the background
    pub auto_commit_interval_ms: u32,
    /// How long `connect` waits for the initial metadata round-trip
    pub metadata_timeout: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "kafka-http-bridge".to_string(),
            topic: "".to_string(),
            client_id: None,
            security_protocol: "SASL_SSL".to_string(),
            sasl_mechanism: "PLAIN".to_string(),
            sasl_username: None,
            sasl_password: None,
            auto_offset_reset: OffsetReset::Earliest,
            session_timeout_ms: 30000,
            auto_commit_interval_ms: 5000,
            metadata_timeout: Duration::from_secs(10),
        }
    }
}

// Credentials stay out of logs.
impl std::fmt::Debug for ConsumerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerConfig")
            .field("brokers", &self.brokers)
            .field("group_id", &self.group_id)
            .field("topic", &self.topic)
            .field("client_id", &self.client_id)
            .field("security_protocol", &self.security_protocol)
            .field("sasl_mechanism", &self.sasl_mechanism)
            .field("sasl_username", &self.sasl_username)
            .field("sasl_password", &self.sasl_password.as_ref().map(|_| "***"))
            .field("auto_offset_reset", &self.auto_offset_reset)
            .field("session_timeout_ms", &self.session_timeout_ms)
            .field("auto_commit_interval_ms", &self.auto_commit_interval_ms)
            .field("metadata_timeout", &self.metadata_timeout)
            .finish()
    }
}

impl ConsumerConfig {
    /// Translate into librdkafka properties.
    ///
    /// Positions are stored automatically when a message is handed to the
    /// application and committed in the background, so a record that fails
    /// downstream is never redelivered because of that failure.
    pub fn client_config(&self) -> Result<ClientConfig> {
        if self.topic.is_empty() {
            return Err(Error::InvalidConfig("topic must not be empty".to_string()));
        }
        if self.group_id.is_empty() {
            return Err(Error::InvalidConfig(
                "group id must not be empty".to_string(),
            ));
        }

        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "true")
            .set(
                "auto.commit.interval.ms",
                self.auto_commit_interval_ms.to_string(),
            )
            .set("auto.offset.reset", self.auto_offset_reset.as_str())
            .set("session.timeout.ms", self.session_timeout_ms.to_string())
            .set("enable.partition.eof", "false")
            .set("security.protocol", &self.security_protocol);

        if let Some(client_id) = &self.client_id {
            config.set("client.id", client_id);
        }

        if self.security_protocol.to_ascii_uppercase().starts_with("SASL") {
            let (Some(username), Some(password)) = (&self.sasl_username, &self.sasl_password)
            else {
                return Err(Error::InvalidConfig(format!(
                    "security protocol {} requires a SASL username and password",
                    self.security_protocol
                )));
            };
            config
                .set("sasl.mechanism", &self.sasl_mechanism)
                .set("sasl.username", username)
                .set("sasl.password", password);
        }

        Ok(config)
    }
}

/// Kafka consumer yielding decoded JSON records
pub struct Consumer {
    consumer: Option<Arc<RdkafkaStreamConsumer>>,
    config: ConsumerConfig,
}

impl Consumer {
    /// Create the consumer, subscribe, and verify the brokers are reachable.
    ///
    /// librdkafka connects lazily, so a metadata round-trip is made here to
    /// surface authentication and network failures before the loop starts.
    pub async fn connect(config: ConsumerConfig) -> Result<Self> {
        let consumer: RdkafkaStreamConsumer = config
            .client_config()?
            .create()
            .map_err(|e| Error::Connect(format!("Failed to create consumer: {e}")))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| Error::Connect(format!("Failed to subscribe to topic: {e}")))?;

        let consumer = Arc::new(consumer);

        let probe = Arc::clone(&consumer);
        let topic = config.topic.clone();
        let timeout = config.metadata_timeout;
        // Reduced to plain data inside the blocking task; the metadata handle
        // itself stays on the blocking thread.
        let topic_state = tokio::task::spawn_blocking(move || {
            probe.fetch_metadata(Some(&topic), timeout).map(|metadata| {
                metadata
                    .topics()
                    .iter()
                    .find(|t| t.name() == topic)
                    .map(|t| (t.partitions().len(), t.error().map(|e| format!("{e:?}"))))
            })
        })
        .await
        .map_err(|e| Error::Connect(format!("Metadata probe task failed: {e}")))?
        .map_err(|e| Error::Connect(format!("Failed to fetch metadata: {e}")))?;

        match topic_state {
            Some((partitions, None)) => {
                debug!("Topic {} has {} partitions", config.topic, partitions);
            }
            Some((_, Some(error))) => {
                warn!("Broker reported an error for topic {}: {}", config.topic, error);
            }
            None => warn!("Topic {} not present in broker metadata", config.topic),
        }

        info!(
            "Connected to {} as group {}",
            config.brokers, config.group_id
        );

        Ok(Self {
            consumer: Some(consumer),
            config,
        })
    }

    /// Receive the next record, waiting until one is available.
    pub async fn next_record(&mut self) -> Result<Record> {
        let consumer = self.consumer.as_ref().ok_or(Error::Closed)?;
        let msg = consumer.recv().await?;
        Ok(decode_message(&msg)?)
    }

    /// Commit what has been consumed so far and leave the group.
    pub async fn close(&mut self) -> Result<()> {
        let Some(consumer) = self.consumer.take() else {
            return Ok(());
        };

        let result = tokio::task::spawn_blocking(move || {
            let committed = match consumer.commit_consumer_state(CommitMode::Sync) {
                Ok(()) => Ok(()),
                // Nothing consumed since the last background commit
                Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => Ok(()),
                Err(e) => Err(e),
            };
            consumer.unsubscribe();
            committed
        })
        .await
        .map_err(|e| Error::Connect(format!("Close task failed: {e}")))?;

        info!("Kafka consumer for topic {} closed", self.config.topic);
        result.map_err(Error::from)
    }

    pub fn is_closed(&self) -> bool {
        self.consumer.is_none()
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }
}

#[async_trait]
impl RecordSource for Consumer {
    async fn next_record(&mut self) -> Result<Record> {
        Consumer::next_record(self).await
    }

    async fn close(&mut self) -> Result<()> {
        Consumer::close(self).await
    }
}

fn decode_message(msg: &RdkafkaBorrowedMessage) -> kafka_types::Result<Record> {
    Record::decode(
        msg.topic(),
        msg.partition(),
        msg.offset(),
        msg.key(),
        msg.timestamp().to_millis(),
        msg.payload(),
    )
}
