//! kafka-http-bridge library
//!
//! Consumes one Kafka topic as part of a consumer group and forwards every
//! record's JSON payload to a fixed HTTP endpoint.
//!
//! # Delivery Semantics
//!
//! - At-least-once with respect to the stream: positions are committed as
//!   records are yielded, so a crash before the commit redelivers a record
//! - Best-effort downstream: each record gets one POST; failures are logged
//!   and never cause a redelivery
//! - Bounded: at most `--max-in-flight` forwards are pending at any time
//!
//! # Crates
//!
//! - `kafka_types` - the `Record` data model
//! - `kafka_source` - the Kafka stream reader
//! - `http_forward` - the forward dispatcher
//!
//! # CLI Usage
//!
//! ```bash
//! SERVER=broker:9093 TOPIC=chat-messages CONSUMER_GRP=bridge \
//! SASL_USERNAME=svc SASL_PASSWORD=secret FORWARD_URL=http://localhost:8080/ \
//! kafka-http-bridge --max-in-flight 50 --overflow-policy block
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod signal;
pub mod testing;

pub use bridge::{run_bridge, BridgeSummary};
pub use config::{Config, ForwardOpts, KafkaOpts};
pub use error::BridgeError;
pub use signal::shutdown_signal;
