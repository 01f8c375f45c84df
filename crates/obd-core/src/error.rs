//! Common error types for snapshot delivery

use thiserror::Error;

/// Errors raised while writing a snapshot to a single subscriber
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Subscriber connection is gone
    #[error("Subscriber closed")]
    Closed,

    /// Write did not complete inside the per-subscriber window
    #[error("Write timed out after {0} ms")]
    Timeout(u64),

    /// Underlying socket/channel error
    #[error("I/O error: {0}")]
    Io(String),
}
