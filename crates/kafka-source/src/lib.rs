//! Kafka stream reader for kafka-http-bridge.
//!
//! This crate owns the subscription side of the bridge:
//!
//! - Consumer Groups: join one consumer group on one topic over SASL/TLS
//! - Auto Commit: positions are stored as records are yielded and committed
//!   in the background, independent of what happens to the record afterwards
//! - Lazy Sequence: records are pulled one at a time with [`RecordSource::next_record`]
//!
//! # Dependency Direction
//!
//! This crate depends on `kafka-types` for the [`Record`] definition so that
//! callers and tests can construct records without linking a broker client.

/// Low-level consumer wrapping rdkafka's `StreamConsumer`
pub mod consumer;
pub mod error;

/// The trait the control loop consumes records through
pub mod source;

pub use kafka_types::{PartitionKey, Record};

pub use consumer::{Consumer, ConsumerConfig, OffsetReset};
pub use error::{Error, Result};
pub use source::RecordSource;
