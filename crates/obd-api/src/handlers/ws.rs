//! WebSocket snapshot subscription
//!
//! Each connection registers a [`WsSubscriber`] with the broadcaster and then
//! only reads, treating inbound messages as keep-alive. A close frame, a read
//! error, removal by the broadcaster or shutdown ends the connection and
//! unsubscribes it.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use obd_core::{DeliveryError, Subscriber};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::state::AppState;

/// Write half of one WebSocket connection
pub struct WsSubscriber {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    closed: CancellationToken,
}

impl WsSubscriber {
    fn new(sink: SplitSink<WebSocket, Message>, closed: CancellationToken) -> Self {
        Self {
            sink: Mutex::new(sink),
            closed,
        }
    }
}

#[async_trait]
impl Subscriber for WsSubscriber {
    async fn deliver(&self, payload: &str) -> Result<(), DeliveryError> {
        if self.closed.is_cancelled() {
            return Err(DeliveryError::Closed);
        }
        self.sink
            .lock()
            .await
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| DeliveryError::Io(e.to_string()))
    }

    async fn close(&self) {
        self.closed.cancel();

        let mut sink = self.sink.lock().await;
        let frame = CloseFrame {
            code: close_code::AWAY,
            reason: "gateway closing connection".into(),
        };
        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
            trace!(error = %e, "Close frame not sent");
        }
        if let Err(e) = sink.close().await {
            trace!(error = %e, "Socket close failed");
        }
    }
}

/// GET /ws
/// Upgrade to a WebSocket and stream every published snapshot
pub async fn subscribe(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, mut stream) = socket.split();
    let closed = state.cancel.child_token();
    let subscriber = Arc::new(WsSubscriber::new(sink, closed.clone()));

    let id = state.broadcaster.subscribe(subscriber.clone()).await;
    info!(subscriber = %id, "WebSocket subscriber connected");

    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            msg = stream.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => trace!(subscriber = %id, "Keep-alive"),
                Some(Err(e)) => {
                    debug!(subscriber = %id, error = %e, "WebSocket read failed");
                    break;
                }
            },
        }
    }

    // The broadcaster closes what it removes; close here only if it had not
    if state.broadcaster.unsubscribe(id).await {
        subscriber.close().await;
    }
    info!(subscriber = %id, "WebSocket subscriber disconnected");
}
