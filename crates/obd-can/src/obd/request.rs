//! Diagnostic request/response framing
//!
//! Request frame: `[declared_len, mode, pid, extra.., 0..]`.
//! Response frame: `[declared_len, mode | 0x40, payload.., 0..]`.

use std::time::Duration;

use obd_core::{RawFrame, MAX_FRAME_DATA};

use super::{mode, ACK_OFFSET};
use crate::error::ObdError;

/// Maximum number of extra bytes (row/column indices) after the PID
pub const MAX_EXTRA_BYTES: usize = 2;

/// A single-frame diagnostic request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRequest {
    pub target_id: u32,
    pub mode: u8,
    pub pid: u8,
    extra: Vec<u8>,
}

impl DiagnosticRequest {
    pub fn new(target_id: u32, mode: u8, pid: u8) -> Self {
        Self {
            target_id,
            mode,
            pid,
            extra: Vec::new(),
        }
    }

    /// Request carrying a (row, column) cell index after the PID
    pub fn with_indices(target_id: u32, mode: u8, pid: u8, row: u8, col: u8) -> Self {
        Self {
            target_id,
            mode,
            pid,
            extra: vec![row, col],
        }
    }

    /// Acknowledgement mode a positive response carries
    pub fn ack_mode(&self) -> u8 {
        self.mode | ACK_OFFSET
    }

    /// Encode as an 8-byte zero-padded frame
    pub fn to_frame(&self) -> RawFrame {
        let extra = &self.extra[..self.extra.len().min(MAX_EXTRA_BYTES)];

        let mut data = [0u8; MAX_FRAME_DATA];
        data[0] = (2 + extra.len()) as u8;
        data[1] = self.mode;
        data[2] = self.pid;
        data[3..3 + extra.len()].copy_from_slice(extra);

        RawFrame::new(self.target_id, &data)
    }
}

/// A request submitted to the correlator together with its matching rule
#[derive(Debug, Clone)]
pub struct CorrelationRequest {
    pub request: DiagnosticRequest,
    pub expected_source_id: u32,
    pub timeout: Duration,
}

impl CorrelationRequest {
    pub fn new(request: DiagnosticRequest, expected_source_id: u32, timeout: Duration) -> Self {
        Self {
            request,
            expected_source_id,
            timeout,
        }
    }

    /// Whether a frame is the answer to this request.
    ///
    /// Identifier and ack mode must match. Current-data and map-cell answers
    /// also echo the PID, which is checked so a late answer to one PID is
    /// not taken for another. Identity answers carry no echo.
    ///
    /// NOTE: row and column are not echoed, so a late answer for one cell
    /// can still be taken for the next cell of the same map.
    pub fn matches(&self, frame: &RawFrame) -> bool {
        if frame.id != self.expected_source_id
            || frame.data.get(1) != Some(&self.request.ack_mode())
        {
            return false;
        }
        if self.echoes_pid() {
            return frame.data.get(2) == Some(&self.request.pid);
        }
        true
    }

    fn echoes_pid(&self) -> bool {
        self.request.mode == mode::CURRENT_DATA || !self.request.extra.is_empty()
    }
}

/// A validated positive response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticResponse {
    pub source_id: u32,
    /// Acknowledgement mode (request mode | 0x40)
    pub mode: u8,
    data: Vec<u8>,
}

impl DiagnosticResponse {
    /// Validate a raw frame as the response to `request_mode`
    pub fn decode(frame: &RawFrame, request_mode: u8) -> Result<Self, ObdError> {
        let data = &frame.data;
        if data.len() < 2 {
            return Err(ObdError::MalformedResponse(format!(
                "frame too short ({} bytes)",
                data.len()
            )));
        }

        let declared = data[0] as usize;
        if declared < 2 {
            return Err(ObdError::MalformedResponse(format!(
                "declared length {} below minimum",
                declared
            )));
        }

        let expected = request_mode | ACK_OFFSET;
        if data[1] != expected {
            return Err(ObdError::MalformedResponse(format!(
                "ack mode 0x{:02X}, expected 0x{:02X}",
                data[1], expected
            )));
        }

        if declared > data.len() {
            return Err(ObdError::MalformedResponse(format!(
                "declared length {} exceeds {} available bytes",
                declared,
                data.len()
            )));
        }

        Ok(Self {
            source_id: frame.id,
            mode: data[1],
            data: data.clone(),
        })
    }

    pub fn declared_len(&self) -> usize {
        self.data[0] as usize
    }

    /// Bytes after the ack mode up to the declared length
    pub fn payload(&self) -> &[u8] {
        &self.data[2..self.declared_len()]
    }

    /// The complete frame payload, including length and ack bytes
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Payload as text: zero padding skipped, surrounding whitespace trimmed
    pub fn payload_text(&self) -> String {
        let bytes: Vec<u8> = self.payload().iter().copied().filter(|b| *b != 0).collect();
        String::from_utf8_lossy(&bytes).trim().to_string()
    }
}
