use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Failed to connect to Kafka: {0}")]
    Connect(String),

    #[error("Failed to decode message: {0}")]
    Decode(#[from] kafka_types::Error),

    #[error("Consumer is closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether the error concerns a single record rather than the session.
    ///
    /// Record-local errors are skipped by the control loop; everything else
    /// means the subscription is no longer usable.
    pub fn is_record_local(&self) -> bool {
        matches!(self, Error::Decode(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
