use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::{DispatchError, ForwardError, Result};
use crate::forwarder::Forwarder;
use crate::sink::OutcomeSink;
use crate::task::{ForwardStatus, ForwardTask, TaskId};

/// What `submit` does when every forward slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OverflowPolicy {
    /// Wait for a slot, suspending the caller
    #[default]
    Block,
    /// Reject the new payload
    DropNew,
    /// Cancel the oldest pending forward and admit the new payload
    DropOldest,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of pending forwards
    pub max_in_flight: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 50,
            overflow_policy: OverflowPolicy::Block,
        }
    }
}

/// Result of a successful `submit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// A forward was started for the payload
    Accepted(TaskId),
    /// The payload was rejected under [`OverflowPolicy::DropNew`]; the
    /// failed task has already been reported
    Dropped(TaskId),
    /// The stop future passed to [`Dispatcher::submit_until`] resolved while
    /// waiting for a slot; the failed task has already been reported
    Abandoned(TaskId),
}

impl Submission {
    pub fn task_id(&self) -> TaskId {
        match self {
            Submission::Accepted(id) | Submission::Dropped(id) | Submission::Abandoned(id) => *id,
        }
    }
}

/// Counters shared between the dispatcher and its tasks.
#[derive(Debug, Default)]
pub struct ForwardStats {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    abandoned: AtomicU64,
    pending: AtomicU64,
    max_pending: AtomicU64,
}

impl ForwardStats {
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::SeqCst)
    }

    /// All failed tasks, including dropped and abandoned ones
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn abandoned(&self) -> u64 {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Tasks currently pending
    pub fn in_flight(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously pending tasks seen so far
    pub fn max_in_flight_observed(&self) -> u64 {
        self.max_pending.load(Ordering::SeqCst)
    }

    fn task_started(&self) {
        let now = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_pending.fetch_max(now, Ordering::SeqCst);
    }

    fn task_finished(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    fn record(&self, task: &ForwardTask) {
        match task.status() {
            ForwardStatus::Succeeded { .. } => {
                self.succeeded.fetch_add(1, Ordering::SeqCst);
            }
            ForwardStatus::Failed(e) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                match e {
                    ForwardError::Dropped => {
                        self.dropped.fetch_add(1, Ordering::SeqCst);
                    }
                    ForwardError::Abandoned => {
                        self.abandoned.fetch_add(1, Ordering::SeqCst);
                    }
                    _ => {}
                }
            }
            ForwardStatus::Pending => {}
        }
    }
}

/// A pending task that can still be evicted under `DropOldest`.
struct PendingEntry {
    id: TaskId,
    evict: CancellationToken,
}

/// Starts one background forward per submitted payload, never more than
/// `max_in_flight` at a time.
pub struct Dispatcher<F: Forwarder> {
    forwarder: Arc<F>,
    sink: Arc<dyn OutcomeSink>,
    stats: Arc<ForwardStats>,
    config: DispatcherConfig,
    slots: Arc<Semaphore>,
    pending: Arc<Mutex<VecDeque<PendingEntry>>>,
    tracker: TaskTracker,
    abandon: CancellationToken,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl<F: Forwarder> Dispatcher<F> {
    pub fn new(forwarder: F, sink: Arc<dyn OutcomeSink>, config: DispatcherConfig) -> Result<Self> {
        if config.max_in_flight == 0 {
            return Err(DispatchError::InvalidConfig(
                "max_in_flight must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            forwarder: Arc::new(forwarder),
            sink,
            stats: Arc::new(ForwardStats::default()),
            slots: Arc::new(Semaphore::new(config.max_in_flight)),
            pending: Arc::new(Mutex::new(VecDeque::with_capacity(config.max_in_flight))),
            config,
            tracker: TaskTracker::new(),
            abandon: CancellationToken::new(),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Hand a payload off for forwarding.
    ///
    /// Returns once the payload holds a slot (or was dropped); the downstream
    /// request runs in the background. Only fails after [`Self::shutdown`]
    /// has started.
    pub async fn submit(&self, payload: Value) -> Result<Submission> {
        self.submit_until(payload, std::future::pending()).await
    }

    /// Like [`Self::submit`], but gives up waiting for a slot once `stop`
    /// resolves.
    ///
    /// A payload given up on still becomes a task: it is resolved as
    /// [`ForwardError::Abandoned`] and reported like any other failure.
    /// `stop` is only polled while every slot is taken.
    pub async fn submit_until<S>(&self, payload: Value, stop: S) -> Result<Submission>
    where
        S: Future<Output = ()>,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DispatchError::Closed);
        }
        tokio::pin!(stop);

        let permit = match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(DispatchError::Closed),
            Err(TryAcquireError::NoPermits) => match self.config.overflow_policy {
                OverflowPolicy::Block => {
                    debug!("All {} forward slots busy, waiting", self.config.max_in_flight);
                    match self.acquire_slot_until(&mut stop).await? {
                        Some(permit) => permit,
                        None => return Ok(self.reject(payload, ForwardError::Abandoned)),
                    }
                }
                OverflowPolicy::DropNew => {
                    return Ok(self.reject(payload, ForwardError::Dropped));
                }
                OverflowPolicy::DropOldest => {
                    if let Some(oldest) = self.pending.lock().await.pop_front() {
                        debug!("Evicting oldest pending forward {}", oldest.id);
                        oldest.evict.cancel();
                    }
                    match self.acquire_slot_until(&mut stop).await? {
                        Some(permit) => permit,
                        None => return Ok(self.reject(payload, ForwardError::Abandoned)),
                    }
                }
            },
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.stats.submitted.fetch_add(1, Ordering::SeqCst);
        self.spawn_forward(ForwardTask::new(id, payload), permit).await;
        Ok(Submission::Accepted(id))
    }

    /// Turn a payload that never got a slot into a reported failed task.
    fn reject(&self, payload: Value, error: ForwardError) -> Submission {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.stats.submitted.fetch_add(1, Ordering::SeqCst);
        let submission = match error {
            ForwardError::Abandoned => Submission::Abandoned(id),
            _ => Submission::Dropped(id),
        };
        let mut task = ForwardTask::new(id, payload);
        task.resolve(Err(error));
        self.stats.record(&task);
        self.sink.report(task);
        submission
    }

    async fn acquire_slot_until<S>(
        &self,
        stop: &mut std::pin::Pin<&mut S>,
    ) -> Result<Option<OwnedSemaphorePermit>>
    where
        S: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = stop.as_mut() => Ok(None),
            permit = self.acquire_slot() => permit.map(Some),
        }
    }

    async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::Closed)
    }

    async fn spawn_forward(&self, mut task: ForwardTask, permit: OwnedSemaphorePermit) {
        let evict = CancellationToken::new();
        self.pending.lock().await.push_back(PendingEntry {
            id: task.id(),
            evict: evict.clone(),
        });
        self.stats.task_started();

        let forwarder = Arc::clone(&self.forwarder);
        let sink = Arc::clone(&self.sink);
        let stats = Arc::clone(&self.stats);
        let pending = Arc::clone(&self.pending);
        let abandon = self.abandon.clone();

        self.tracker.spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = evict.cancelled() => Err(ForwardError::Dropped),
                _ = abandon.cancelled() => Err(ForwardError::Abandoned),
                result = forwarder.forward(task.payload()) => result,
            };

            let id = task.id();
            task.resolve(outcome);
            stats.record(&task);
            stats.task_finished();
            sink.report(task);
            drop(permit);
            // Leave the eviction queue only once the slot is free, so a
            // finished task is evicted ahead of a live one.
            pending.lock().await.retain(|entry| entry.id != id);
        });
    }

    /// Stop admitting payloads and wind down pending forwards.
    ///
    /// Pending forwards get `grace` to finish; whatever is still running after
    /// that is cancelled and reported as abandoned. When this returns no task
    /// is pending.
    pub async fn shutdown(&self, grace: Duration) -> Arc<ForwardStats> {
        self.closed.store(true, Ordering::SeqCst);
        self.slots.close();
        self.tracker.close();

        let in_flight = self.stats.in_flight();
        if in_flight > 0 {
            info!(
                "Waiting up to {:?} for {} pending forwards",
                grace, in_flight
            );
        }

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                "{} forwards still pending after {:?}, abandoning them",
                self.stats.in_flight(),
                grace
            );
            self.abandon.cancel();
            self.tracker.wait().await;
        }

        Arc::clone(&self.stats)
    }

    pub fn stats(&self) -> &ForwardStats {
        &self.stats
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
