//! Frame transport trait and the shared inbound channel

use async_trait::async_trait;
use obd_core::RawFrame;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::TransportError;

/// Capacity of the inbound frame channel
pub const INBOUND_CAPACITY: usize = 100;

/// Raw frame I/O against a diagnostic bus
///
/// The transport owns a single inbound stream. It is handed out once via
/// [`take_inbound`](FrameTransport::take_inbound); whoever holds it is the
/// only reader, so correlation and backlog draining can be arbitrated in
/// one place.
#[async_trait]
pub trait FrameTransport: Send + Sync {
    /// Write one frame to the bus
    async fn send(&self, frame: &RawFrame) -> Result<(), TransportError>;

    /// Take the inbound frame stream; `None` once it has been taken
    fn take_inbound(&self) -> Option<mpsc::Receiver<RawFrame>>;

    /// Check if the transport is connected
    async fn is_connected(&self) -> bool;

    /// Release the bus; later sends fail with `Closed`
    async fn close(&self);
}

/// Sender/receiver pair backing a transport's inbound stream
pub(crate) struct InboundChannel {
    tx: mpsc::Sender<RawFrame>,
    rx: Mutex<Option<mpsc::Receiver<RawFrame>>>,
}

impl InboundChannel {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<RawFrame> {
        self.tx.clone()
    }

    pub(crate) fn take(&self) -> Option<mpsc::Receiver<RawFrame>> {
        self.rx.lock().take()
    }
}

/// Queue a received frame without blocking; frames are dropped when the
/// channel is full. Returns false once the receiver is gone.
pub(crate) fn push_inbound(tx: &mpsc::Sender<RawFrame>, frame: RawFrame) -> bool {
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(frame)) => {
            tracing::warn!(frame = %frame, "Inbound frame channel full, dropping frame");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}
