//! Application state for the snapshot API

use std::sync::Arc;

use obd_core::Broadcaster;
use tokio_util::sync::CancellationToken;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Fan-out that WebSocket connections register with
    pub broadcaster: Arc<Broadcaster>,
    /// Cancelled on shutdown; ends open WebSocket read loops
    pub cancel: CancellationToken,
}

impl AppState {
    pub fn new(broadcaster: Arc<Broadcaster>, cancel: CancellationToken) -> Self {
        Self {
            broadcaster,
            cancel,
        }
    }
}
