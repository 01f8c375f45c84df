//! Frame transport errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Cannot open CAN interface {interface}: {reason}")]
    Open { interface: String, reason: String },

    #[error("Bus connection closed")]
    Closed,

    #[error("Frame 0x{id:03X} cannot be sent: {reason}")]
    InvalidFrame { id: u32, reason: String },

    #[error("Bus write failed: {0}")]
    Write(String),

    /// The single inbound stream was already handed out
    #[error("Inbound frame stream already claimed")]
    StreamClaimed,

    #[error("Transport not supported: {0}")]
    Unsupported(String),
}
