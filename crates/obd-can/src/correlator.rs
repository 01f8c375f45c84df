//! Request/response correlation over a shared inbound frame stream
//!
//! Responses carry no request tag beyond their source identifier, ack mode
//! and (for current data) the echoed PID, so only one exchange may wait on
//! the stream at a time. The correlator owns the inbound receiver behind an
//! async mutex: holding the lock is the exchange-in-progress token.
//!
//! Frames an exchange rejects are never offered to it again. They go to a
//! separate set-aside queue under a short synchronous lock, so the backlog
//! drain can always return them, even while an exchange is still waiting.
//! The drain only reads the live stream when it can take the async lock
//! without waiting.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use obd_core::RawFrame;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::DiagnosticsConfig;
use crate::error::ObdError;
use crate::obd::{CorrelationRequest, DiagnosticRequest, DiagnosticResponse};
use crate::transport::{FrameTransport, TransportError, INBOUND_CAPACITY};

/// Serialises diagnostic exchanges against one transport
pub struct Correlator {
    transport: Arc<dyn FrameTransport>,
    inbound: Mutex<mpsc::Receiver<RawFrame>>,
    /// Frames rejected by exchanges, oldest first, at most `INBOUND_CAPACITY`
    rejected: parking_lot::Mutex<VecDeque<RawFrame>>,
    request_id: u32,
    response_id: u32,
    timeout: Duration,
}

impl Correlator {
    /// Claim the transport's inbound stream.
    ///
    /// Fails if another component already took the stream.
    pub fn new(
        transport: Arc<dyn FrameTransport>,
        config: &DiagnosticsConfig,
    ) -> Result<Self, TransportError> {
        let rx = transport
            .take_inbound()
            .ok_or(TransportError::StreamClaimed)?;

        Ok(Self {
            transport,
            inbound: Mutex::new(rx),
            rejected: parking_lot::Mutex::new(VecDeque::new()),
            request_id: config.request_id,
            response_id: config.response_id,
            timeout: config.exchange_timeout(),
        })
    }

    /// Build a correlation request with the configured addressing and window
    pub fn request(&self, mode: u8, pid: u8) -> CorrelationRequest {
        CorrelationRequest::new(
            DiagnosticRequest::new(self.request_id, mode, pid),
            self.response_id,
            self.timeout,
        )
    }

    /// Like [`request`](Self::request) with a (row, column) cell index
    pub fn cell_request(&self, mode: u8, pid: u8, row: u8, col: u8) -> CorrelationRequest {
        CorrelationRequest::new(
            DiagnosticRequest::with_indices(self.request_id, mode, pid, row, col),
            self.response_id,
            self.timeout,
        )
    }

    /// Send one request and wait for its response.
    ///
    /// Exactly one frame is written per call. Frames that do not match are
    /// set aside for the backlog. The window starts once this call owns the
    /// stream.
    pub async fn exchange(&self, req: &CorrelationRequest) -> Result<DiagnosticResponse, ObdError> {
        let mut inbound = self.inbound.lock().await;
        let deadline = Instant::now() + req.timeout;

        let (mode, pid) = (req.request.mode, req.request.pid);
        self.transport.send(&req.request.to_frame()).await?;

        loop {
            let frame = match tokio::time::timeout_at(deadline, inbound.recv()).await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Err(ObdError::Transport(TransportError::Closed)),
                Err(_) => {
                    debug!(
                        mode = format!("0x{:02X}", mode),
                        pid = format!("0x{:02X}", pid),
                        "Exchange timed out"
                    );
                    return Err(ObdError::Timeout {
                        mode,
                        pid,
                        timeout: req.timeout,
                    });
                }
            };

            if req.matches(&frame) {
                trace!(frame = %frame, "Matched response");
                return DiagnosticResponse::decode(&frame, mode);
            }

            debug!(
                frame = %frame,
                expected_id = format!("0x{:03X}", req.expected_source_id),
                "Setting aside non-matching frame during exchange"
            );
            self.set_aside(frame);
        }
    }

    fn set_aside(&self, frame: RawFrame) {
        let mut rejected = self.rejected.lock();
        if rejected.len() >= INBOUND_CAPACITY {
            rejected.pop_front();
        }
        rejected.push_back(frame);
    }

    /// Pull every set-aside and queued frame without waiting, oldest first.
    ///
    /// Set-aside frames are always returned. The live stream is only read
    /// when no exchange owns it, so a response in flight is never taken by
    /// the drain.
    pub fn drain_backlog(&self) -> Vec<RawFrame> {
        let mut frames: Vec<RawFrame> = self.rejected.lock().drain(..).collect();

        match self.inbound.try_lock() {
            Ok(mut inbound) => {
                while let Ok(frame) = inbound.try_recv() {
                    frames.push(frame);
                }
            }
            Err(_) => trace!(
                set_aside = frames.len(),
                "Exchange in progress, draining set-aside frames only"
            ),
        }
        frames
    }

    /// Write a frame outside of any exchange (bus activity, test traffic)
    pub async fn send_raw(&self, frame: &RawFrame) -> Result<(), TransportError> {
        self.transport.send(frame).await
    }
}
