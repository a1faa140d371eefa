//! Record types for kafka-http-bridge.
//!
//! This crate holds the data model shared between the stream reader
//! (`kafka-source`), the forward dispatcher's callers, and the tests:
//!
//! - [`message`] - the immutable [`Record`] handed out by the reader
//! - [`error`] - payload decoding errors
//!
//! Payloads are JSON documents. The bridge treats them as opaque apart from
//! the optional `data.text` field, which is only used for log lines.

pub mod error;
pub mod message;

pub use error::{Error, Result};
pub use message::{PartitionKey, Record};
