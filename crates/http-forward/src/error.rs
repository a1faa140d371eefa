use thiserror::Error;

/// Why a single forward did not succeed.
///
/// These never leave the dispatcher as `Err` values; they end up in the
/// failed [`crate::ForwardStatus`] of the task and are reported to the sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForwardError {
    #[error("Failed to connect to downstream: {0}")]
    Connect(String),

    #[error("Downstream request timed out")]
    Timeout,

    #[error("Downstream responded with status {0}")]
    Status(u16),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Failed to encode payload: {0}")]
    Encode(String),

    #[error("Dropped because every forward slot was taken")]
    Dropped,

    #[error("Abandoned at shutdown before the downstream responded")]
    Abandoned,
}

impl From<reqwest::Error> for ForwardError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ForwardError::Timeout
        } else if e.is_connect() {
            ForwardError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            ForwardError::Status(status.as_u16())
        } else if e.is_builder() || e.is_body() {
            ForwardError::Encode(e.to_string())
        } else {
            ForwardError::Request(e.to_string())
        }
    }
}

/// Errors returned to the caller of the dispatcher itself.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Dispatcher is shut down")]
    Closed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
