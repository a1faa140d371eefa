//! Forward task state machine.
//!
//! ```text
//! Pending ──► Succeeded
//!    │
//!    └──────► Failed
//! ```
//!
//! A task is created `Pending` when a payload is admitted and resolved exactly
//! once. Terminal states are final.

use serde_json::Value;

use crate::error::ForwardError;

/// Monotonic id assigned at submission, in submission order.
pub type TaskId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardStatus {
    Pending,
    /// The downstream status line was received
    Succeeded {
        status: u16,
    },
    Failed(ForwardError),
}

/// One delivery attempt of one payload.
#[derive(Debug, Clone)]
pub struct ForwardTask {
    id: TaskId,
    payload: Value,
    status: ForwardStatus,
}

impl ForwardTask {
    pub fn new(id: TaskId, payload: Value) -> Self {
        Self {
            id,
            payload,
            status: ForwardStatus::Pending,
        }
    }

    /// Move a pending task to its terminal state.
    ///
    /// Returns `false` and leaves the task untouched if it was already resolved.
    pub fn resolve(&mut self, outcome: std::result::Result<u16, ForwardError>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = match outcome {
            Ok(status) => ForwardStatus::Succeeded { status },
            Err(e) => ForwardStatus::Failed(e),
        };
        true
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn status(&self) -> &ForwardStatus {
        &self.status
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, ForwardStatus::Pending)
    }

    pub fn error(&self) -> Option<&ForwardError> {
        match &self.status {
            ForwardStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}
