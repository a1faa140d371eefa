//! Fire-and-forget HTTP forwarding with a bounded number of in-flight requests.
//!
//! Features:
//!
//! - Non-blocking submission: [`Dispatcher::submit`] returns as soon as the
//!   payload has a slot, never waiting for the downstream response
//! - Bounded concurrency: at most `max_in_flight` forwards are pending at once;
//!   the [`OverflowPolicy`] decides what happens when every slot is taken
//! - Typed outcomes: every submission produces exactly one [`ForwardTask`] that
//!   ends `Succeeded` or `Failed` and is handed to an [`OutcomeSink`]
//! - Graceful shutdown: [`Dispatcher::shutdown`] drains pending forwards for a
//!   grace period and abandons the rest, so nothing is left pending

/// Slot pool, overflow handling and shutdown
pub mod dispatcher;
pub mod error;

/// Downstream delivery: the `Forwarder` trait and its reqwest implementation
pub mod forwarder;
pub mod sink;
pub mod task;

pub use dispatcher::{Dispatcher, DispatcherConfig, ForwardStats, OverflowPolicy, Submission};
pub use error::{DispatchError, ForwardError, Result};
pub use forwarder::{Forwarder, HttpForwarder, HttpForwarderConfig, StatusPolicy};
pub use sink::{ChannelSink, OutcomeSink, TracingSink};
pub use task::{ForwardStatus, ForwardTask, TaskId};

pub use reqwest::Url;
