//! Raw classic-CAN transport over SocketCAN

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use obd_core::RawFrame;
use parking_lot::Mutex;
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket, StandardId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::SocketCanConfig;
use crate::transport::adapter::{push_inbound, InboundChannel};
use crate::transport::{FrameTransport, TransportError};

/// Largest 11-bit identifier; anything above goes out as a 29-bit frame
const MAX_STANDARD_ID: u32 = 0x7FF;

/// SocketCAN transport on a raw CAN socket
pub struct SocketCanTransport {
    interface: String,
    socket: Arc<Mutex<CanSocket>>,
    connected: Arc<AtomicBool>,
    inbound: InboundChannel,
    listener_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SocketCanTransport {
    /// Open the interface and start the background reader
    pub fn open(config: &SocketCanConfig) -> Result<Self, TransportError> {
        let open_error = |e: std::io::Error| TransportError::Open {
            interface: config.interface.clone(),
            reason: e.to_string(),
        };
        let socket = CanSocket::open(&config.interface).map_err(open_error)?;
        socket.set_nonblocking(true).map_err(open_error)?;

        let transport = Self {
            interface: config.interface.clone(),
            socket: Arc::new(Mutex::new(socket)),
            connected: Arc::new(AtomicBool::new(true)),
            inbound: InboundChannel::new(),
            listener_handle: Mutex::new(None),
        };

        transport.start_listener();
        tracing::info!(interface = %transport.interface, "SocketCAN transport opened");

        Ok(transport)
    }

    fn start_listener(&self) {
        let socket = self.socket.clone();
        let connected = self.connected.clone();
        let tx = self.inbound.sender();

        let handle = tokio::task::spawn_blocking(move || {
            while connected.load(Ordering::SeqCst) {
                let result = socket.lock().read_frame();
                match result {
                    Ok(frame) => {
                        let raw = RawFrame::new(frame.raw_id(), frame.data());
                        tracing::trace!(frame = %raw, "Inbound CAN frame");
                        if !push_inbound(&tx, raw) {
                            tracing::debug!("Inbound receiver dropped, stopping reader");
                            break;
                        }
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Err(e) => {
                        tracing::error!(?e, "SocketCAN read error");
                        std::thread::sleep(Duration::from_millis(100));
                    }
                }
            }
            tracing::debug!("SocketCAN listener stopped");
        });

        *self.listener_handle.lock() = Some(handle);
    }
}

fn to_can_frame(frame: &RawFrame) -> Result<CanFrame, TransportError> {
    let can_frame = if frame.id <= MAX_STANDARD_ID {
        let id = StandardId::new(frame.id as u16)
            .ok_or_else(|| invalid(frame, "bad standard id"))?;
        CanFrame::new(id, &frame.data)
    } else {
        let id = ExtendedId::new(frame.id)
            .ok_or_else(|| invalid(frame, "bad extended id"))?;
        CanFrame::new(id, &frame.data)
    };

    can_frame.ok_or_else(|| invalid(frame, &format!("{} byte payload", frame.data.len())))
}

fn invalid(frame: &RawFrame, reason: &str) -> TransportError {
    TransportError::InvalidFrame {
        id: frame.id,
        reason: reason.to_string(),
    }
}

#[async_trait]
impl FrameTransport for SocketCanTransport {
    async fn send(&self, frame: &RawFrame) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let can_frame = to_can_frame(frame)?;
        let socket = self.socket.clone();

        tokio::task::spawn_blocking(move || {
            socket
                .lock()
                .write_frame(&can_frame)
                .map_err(|e| TransportError::Write(e.to_string()))
        })
        .await
        .map_err(|e| TransportError::Write(format!("writer task failed: {}", e)))??;

        tracing::debug!(frame = %frame, "Sent CAN frame");
        Ok(())
    }

    fn take_inbound(&self) -> Option<mpsc::Receiver<RawFrame>> {
        self.inbound.take()
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);

        let handle = self.listener_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "SocketCAN listener task failed");
            }
        }
        tracing::info!(interface = %self.interface, "SocketCAN transport closed");
    }
}

impl Drop for SocketCanTransport {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}
