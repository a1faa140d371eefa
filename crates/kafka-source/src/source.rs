//! Record source abstraction.

use async_trait::async_trait;
use kafka_types::Record;

use crate::error::Result;

/// A lazy, infinite sequence of records.
///
/// The Kafka [`crate::Consumer`] is the production implementation. The
/// control loop is generic over this trait so that it can be driven by
/// in-memory sources in tests.
#[async_trait]
pub trait RecordSource: Send {
    /// Wait for the next record.
    ///
    /// Must be cancel-safe: dropping the returned future before it completes
    /// must not lose a record.
    async fn next_record(&mut self) -> Result<Record>;

    /// Release the subscription.
    ///
    /// After `close` returns, `next_record` fails with [`crate::Error::Closed`].
    /// Calling `close` twice is a no-op.
    async fn close(&mut self) -> Result<()>;
}
