//! Snapshot fan-out to connected subscribers
//!
//! The broadcaster owns the subscriber set. Subscribe, unsubscribe and the
//! publish traversal all go through the same async mutex, so a connection
//! that arrives or leaves mid-broadcast waits for the traversal to finish.
//! Each write is time-boxed and all writes of one publish run concurrently,
//! so a slow subscriber cannot stall delivery to the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::latest::Latest;
use crate::models::TelemetrySnapshot;

/// Default per-subscriber write window
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Handle identifying one subscription
pub type SubscriberId = Uuid;

/// A sink that receives serialized snapshots
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Write one serialized snapshot
    async fn deliver(&self, payload: &str) -> Result<(), DeliveryError>;

    /// Close the underlying connection; called on removal and shutdown
    async fn close(&self) {}
}

/// Fans each published snapshot out to every current subscriber
pub struct Broadcaster {
    subscribers: Mutex<HashMap<SubscriberId, Arc<dyn Subscriber>>>,
    write_timeout: Duration,
    last_payload: Latest<String>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_write_timeout(DEFAULT_WRITE_TIMEOUT)
    }

    pub fn with_write_timeout(write_timeout: Duration) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            write_timeout,
            last_payload: Latest::new(),
        }
    }

    /// Register a subscriber and return its handle
    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = Uuid::new_v4();
        let mut subscribers = self.subscribers.lock().await;
        subscribers.insert(id, subscriber);
        info!(subscriber_id = %id, total = subscribers.len(), "Subscriber added");
        id
    }

    /// Remove a subscriber; returns false if it was already gone
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock().await;
        let removed = subscribers.remove(&id).is_some();
        if removed {
            info!(subscriber_id = %id, total = subscribers.len(), "Subscriber removed");
        }
        removed
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Most recently published payload (serialized JSON)
    pub fn last_payload(&self) -> Option<Arc<String>> {
        self.last_payload.get()
    }

    /// Serialize the snapshot once and write it to every subscriber.
    ///
    /// Subscribers whose write fails or times out are removed and closed.
    /// Returns the number of successful deliveries.
    pub async fn publish(&self, snapshot: &TelemetrySnapshot) -> usize {
        let payload = match serde_json::to_string(snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, seq = snapshot.seq, "Failed to serialize snapshot");
                return 0;
            }
        };

        let payload = Arc::new(payload);
        self.last_payload.publish_arc(payload.clone());

        let mut subscribers = self.subscribers.lock().await;
        let write_timeout = self.write_timeout;

        let results = join_all(subscribers.iter().map(|(id, subscriber)| {
            let payload = payload.as_str();
            async move {
                let result = match tokio::time::timeout(write_timeout, subscriber.deliver(payload))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(DeliveryError::Timeout(write_timeout.as_millis() as u64)),
                };
                (*id, result)
            }
        }))
        .await;

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(subscriber_id = %id, error = %e, "Dropping subscriber after failed write");
                    failed.push(id);
                }
            }
        }

        let removed: Vec<_> = failed
            .iter()
            .filter_map(|id| subscribers.remove(id))
            .collect();
        drop(subscribers);

        self.close_each(removed).await;

        debug!(seq = snapshot.seq, delivered, dropped = failed.len(), "Snapshot published");
        delivered
    }

    /// Remove and close every subscriber (shutdown path)
    pub async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut subscribers = self.subscribers.lock().await;
            subscribers.drain().map(|(_, s)| s).collect()
        };

        if !drained.is_empty() {
            info!(count = drained.len(), "Closing all subscribers");
        }
        self.close_each(drained).await;
    }

    async fn close_each(&self, subscribers: Vec<Arc<dyn Subscriber>>) {
        let write_timeout = self.write_timeout;
        join_all(subscribers.iter().map(|subscriber| async move {
            if tokio::time::timeout(write_timeout, subscriber.close())
                .await
                .is_err()
            {
                debug!("Subscriber close timed out");
            }
        }))
        .await;
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber backed by an mpsc channel (in-process consumers and tests)
pub struct ChannelSubscriber {
    tx: tokio::sync::mpsc::Sender<String>,
}

impl ChannelSubscriber {
    pub fn new(tx: tokio::sync::mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// Create a subscriber together with the receiving end
    pub fn channel(capacity: usize) -> (Self, tokio::sync::mpsc::Receiver<String>) {
        let (tx, rx) = tokio::sync::mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    async fn deliver(&self, payload: &str) -> Result<(), DeliveryError> {
        self.tx
            .send(payload.to_string())
            .await
            .map_err(|_| DeliveryError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSubscriber {
        attempts: AtomicUsize,
        closed: AtomicUsize,
    }

    #[async_trait]
    impl Subscriber for FailingSubscriber {
        async fn deliver(&self, _payload: &str) -> Result<(), DeliveryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(DeliveryError::Io("broken pipe".to_string()))
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StalledSubscriber;

    #[async_trait]
    impl Subscriber for StalledSubscriber {
        async fn deliver(&self, _payload: &str) -> Result<(), DeliveryError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failing_subscriber_removed_others_receive_everything() {
        let broadcaster = Broadcaster::new();

        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (subscriber, rx) = ChannelSubscriber::channel(16);
            broadcaster.subscribe(Arc::new(subscriber)).await;
            receivers.push(rx);
        }

        let failing = Arc::new(FailingSubscriber {
            attempts: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        });
        broadcaster.subscribe(failing.clone()).await;
        assert_eq!(broadcaster.subscriber_count().await, 4);

        for seq in 0..5 {
            let delivered = broadcaster.publish(&TelemetrySnapshot::new(seq)).await;
            assert_eq!(delivered, 3);
        }

        // Removed after its first failed publish, never retried
        assert_eq!(failing.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(failing.closed.load(Ordering::SeqCst), 1);
        assert_eq!(broadcaster.subscriber_count().await, 3);

        for rx in receivers.iter_mut() {
            for seq in 0..5u64 {
                let payload = rx.recv().await.unwrap();
                let snapshot: TelemetrySnapshot = serde_json::from_str(&payload).unwrap();
                assert_eq!(snapshot.seq, seq);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_subscriber_is_time_boxed() {
        let broadcaster = Broadcaster::with_write_timeout(Duration::from_millis(50));
        let (subscriber, mut rx) = ChannelSubscriber::channel(4);
        broadcaster.subscribe(Arc::new(subscriber)).await;
        broadcaster.subscribe(Arc::new(StalledSubscriber)).await;

        let started = tokio::time::Instant::now();
        let delivered = broadcaster.publish(&TelemetrySnapshot::new(0)).await;

        assert_eq!(delivered, 1);
        assert!(started.elapsed() < Duration::from_millis(200));
        assert!(rx.recv().await.is_some());
        assert_eq!(broadcaster.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_and_last_payload() {
        let broadcaster = Broadcaster::new();
        assert!(broadcaster.last_payload().is_none());

        let (subscriber, mut rx) = ChannelSubscriber::channel(4);
        let id = broadcaster.subscribe(Arc::new(subscriber)).await;
        assert!(broadcaster.unsubscribe(id).await);
        assert!(!broadcaster.unsubscribe(id).await);

        assert_eq!(broadcaster.publish(&TelemetrySnapshot::new(3)).await, 0);
        assert!(rx.try_recv().is_err());

        let last = broadcaster.last_payload().unwrap();
        assert!(last.contains("\"seq\":3"));
    }

    #[tokio::test]
    async fn test_close_all_empties_set() {
        let broadcaster = Broadcaster::new();
        let failing = Arc::new(FailingSubscriber {
            attempts: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        });
        broadcaster.subscribe(failing.clone()).await;

        broadcaster.close_all().await;

        assert_eq!(broadcaster.subscriber_count().await, 0);
        assert_eq!(failing.closed.load(Ordering::SeqCst), 1);
    }
}
