//! The consume-and-forward control loop.
//!
//! One task pulls records from the source in arrival order and hands each
//! payload to the dispatcher without waiting for the downstream response.
//! Positions are acknowledged by the source as records are yielded, so a
//! failed forward never causes a redelivery.
//!
//! On the stop signal the loop stops taking records, gives pending forwards
//! the grace period, and then closes the source, in that order. A broken
//! subscription takes the same path before the error is returned.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use http_forward::{Dispatcher, ForwardStats, Forwarder, Submission};
use kafka_source::RecordSource;
use tracing::{debug, error, info, warn};

use crate::error::BridgeError;

/// What happened during one run of the loop.
#[derive(Debug)]
pub struct BridgeSummary {
    /// Records yielded by the source
    pub received: u64,
    /// Records skipped because their payload could not be decoded
    pub skipped: u64,
    /// Records whose task was abandoned because the stop signal arrived
    /// while waiting for a forward slot
    pub interrupted: u64,
    pub forwards: Arc<ForwardStats>,
}

impl BridgeSummary {
    pub fn log(&self) {
        info!(
            "Bridge stopped: received={} skipped={} interrupted={} forwarded={} failed={} (dropped={} abandoned={})",
            self.received,
            self.skipped,
            self.interrupted,
            self.forwards.succeeded(),
            self.forwards.failed(),
            self.forwards.dropped(),
            self.forwards.abandoned(),
        );
    }
}

/// Run until `shutdown` resolves or the source fails.
///
/// Returns the summary after a stop signal; returns the source's error after
/// the dispatcher has been drained and the source closed.
pub async fn run_bridge<S, F, Sd>(
    source: &mut S,
    dispatcher: &Dispatcher<F>,
    shutdown: Sd,
    grace: Duration,
) -> Result<BridgeSummary, BridgeError>
where
    S: RecordSource,
    F: Forwarder,
    Sd: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut received = 0u64;
    let mut skipped = 0u64;
    let mut interrupted = 0u64;

    let outcome: Result<(), BridgeError> = loop {
        let next = tokio::select! {
            biased;
            _ = &mut shutdown => break Ok(()),
            next = source.next_record() => next,
        };

        let record = match next {
            Ok(record) => record,
            Err(e) if e.is_record_local() => {
                warn!("Skipping message: {e}");
                skipped += 1;
                continue;
            }
            Err(e) => {
                error!("Stream reader failed: {e}");
                break Err(e.into());
            }
        };

        received += 1;
        match record.text() {
            Some(text) => info!("Received message: {text}"),
            None => info!("Received message at {}@{}", record.partition_key(), record.offset),
        }

        let position = format!("{}@{}", record.partition_key(), record.offset);
        match dispatcher
            .submit_until(record.payload, shutdown.as_mut())
            .await
        {
            Ok(Submission::Accepted(id)) => debug!("Message at {position} handed off as task {id}"),
            Ok(Submission::Dropped(id)) => debug!("Message at {position} dropped as task {id}"),
            Ok(Submission::Abandoned(id)) => {
                warn!("Message at {position} abandoned as task {id}: stopped while waiting for a forward slot");
                interrupted += 1;
                break Ok(());
            }
            Err(e) => break Err(e.into()),
        }
    };

    info!("Stopping consumer...");
    let forwards = dispatcher.shutdown(grace).await;

    if let Err(e) = source.close().await {
        warn!("Failed to close the stream cleanly: {e}");
    }

    let summary = BridgeSummary {
        received,
        skipped,
        interrupted,
        forwards,
    };
    summary.log();

    outcome.map(|()| summary)
}
