//! Transport layer for raw diagnostic frames
//!
//! This module provides the frame transports the engine runs on:
//! - SocketCAN adapter for raw classic CAN (Linux only)
//! - Mock adapter with a simulated ECU for testing

mod adapter;
pub mod error;
pub mod mock;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use adapter::{FrameTransport, INBOUND_CAPACITY};
pub use error::TransportError;
pub use mock::MockTransport;

use std::sync::Arc;

use crate::config::TransportConfig;

/// Create a frame transport based on configuration.
///
/// Returns `Ok(None)` when the bus is explicitly disabled.
pub async fn create_transport(
    config: &TransportConfig,
) -> Result<Option<Arc<dyn FrameTransport>>, TransportError> {
    match config {
        #[cfg(all(target_os = "linux", feature = "socketcan"))]
        TransportConfig::SocketCan(cfg) => {
            let adapter = socketcan::SocketCanTransport::open(cfg)?;
            Ok(Some(Arc::new(adapter)))
        }
        #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
        TransportConfig::SocketCan(_) => Err(TransportError::Unsupported(
            "SocketCAN requires Linux and the 'socketcan' feature".to_string(),
        )),
        TransportConfig::Mock(cfg) => Ok(Some(Arc::new(MockTransport::new(cfg)))),
        TransportConfig::None => Ok(None),
    }
}
