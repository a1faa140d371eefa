//! Process-level error taxonomy.

use thiserror::Error;

/// Fatal errors. Per-record forward failures never become one of these.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Missing or invalid settings; the consume loop never starts
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Broker unreachable, authentication rejected, or the subscription broke
    #[error("Connection error: {0}")]
    Connection(kafka_source::Error),

    #[error("Dispatcher error: {0}")]
    Dispatch(http_forward::DispatchError),
}

impl BridgeError {
    /// Process exit status for this error.
    ///
    /// Configuration errors use 2, matching clap's usage errors; everything
    /// else exits with 1. A clean interrupt exits with 0.
    pub fn exit_code(&self) -> i32 {
        match self {
            BridgeError::Configuration(_) => 2,
            BridgeError::Connection(_) | BridgeError::Dispatch(_) => 1,
        }
    }
}

impl From<kafka_source::Error> for BridgeError {
    fn from(e: kafka_source::Error) -> Self {
        match e {
            kafka_source::Error::InvalidConfig(msg) => BridgeError::Configuration(msg),
            other => BridgeError::Connection(other),
        }
    }
}

impl From<http_forward::DispatchError> for BridgeError {
    fn from(e: http_forward::DispatchError) -> Self {
        match e {
            http_forward::DispatchError::InvalidConfig(msg) => BridgeError::Configuration(msg),
            other => BridgeError::Dispatch(other),
        }
    }
}
