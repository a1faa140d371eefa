//! Where resolved forward tasks are reported.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::task::{ForwardStatus, ForwardTask};

/// Receives every task once it reaches a terminal state.
///
/// Called from the forwarding tasks themselves, so implementations must not
/// block.
pub trait OutcomeSink: Send + Sync + 'static {
    fn report(&self, task: ForwardTask);
}

/// Logs one status line per resolved task.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutcomeSink for TracingSink {
    fn report(&self, task: ForwardTask) {
        match task.status() {
            ForwardStatus::Succeeded { status } => {
                info!("Forwarded message {}: server responded {}", task.id(), status);
            }
            ForwardStatus::Failed(e) => {
                warn!("Failed to forward message {}: {}", task.id(), e);
            }
            ForwardStatus::Pending => {
                warn!("Task {} reported while still pending", task.id());
            }
        }
    }
}

/// Sends resolved tasks over a channel.
///
/// Reports are discarded once the receiver is dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ForwardTask>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ForwardTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl OutcomeSink for ChannelSink {
    fn report(&self, task: ForwardTask) {
        let _ = self.tx.send(task);
    }
}
