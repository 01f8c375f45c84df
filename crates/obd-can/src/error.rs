//! Protocol engine errors

use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

/// Outcome of a single failed diagnostic exchange
#[derive(Debug, Error, Clone)]
pub enum ObdError {
    /// Write/connect failure on the bus
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// No matching response inside the exchange window
    #[error("Timeout waiting for mode 0x{mode:02X} pid 0x{pid:02X} after {timeout:?}")]
    Timeout {
        mode: u8,
        pid: u8,
        timeout: Duration,
    },

    /// Wrong acknowledgement mode or inconsistent declared length
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Configuration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid CAN ID '{0}'")]
    InvalidCanId(String),
}
