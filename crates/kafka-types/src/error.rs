//! Error types for kafka-types crate.

use thiserror::Error;

/// Errors that can occur while turning raw Kafka bytes into a [`crate::Record`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("Message at {topic}[{partition}]@{offset} has no payload")]
    EmptyPayload {
        topic: String,
        partition: i32,
        offset: i64,
    },

    #[error("Message at {topic}[{partition}]@{offset} is not valid JSON: {source}")]
    InvalidJson {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type alias for kafka-types operations.
pub type Result<T> = std::result::Result<T, Error>;
