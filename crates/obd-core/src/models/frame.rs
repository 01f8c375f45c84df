//! Raw bus frames

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum payload of a classic CAN frame
pub const MAX_FRAME_DATA: usize = 8;

/// A single frame as seen on the diagnostic bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFrame {
    /// Arbitration identifier
    pub id: u32,
    /// Frame payload (0..=8 bytes)
    pub data: Vec<u8>,
    /// When the frame was received (or created, for outbound frames)
    pub timestamp: DateTime<Utc>,
}

impl RawFrame {
    /// Create a frame stamped with the current time.
    ///
    /// Payloads longer than [`MAX_FRAME_DATA`] are truncated.
    pub fn new(id: u32, data: &[u8]) -> Self {
        let len = data.len().min(MAX_FRAME_DATA);
        Self {
            id,
            data: data[..len].to_vec(),
            timestamp: Utc::now(),
        }
    }

    /// Payload rendered as uppercase hex, for logging
    pub fn data_hex(&self) -> String {
        hex::encode_upper(&self.data)
    }
}

impl std::fmt::Display for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:03X} [{}] {}", self.id, self.data.len(), self.data_hex())
    }
}
