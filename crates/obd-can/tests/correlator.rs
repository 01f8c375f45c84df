//! Correlator timing and cross-talk tests.
//!
//! The echo transport answers every request on the response address with a
//! frame that carries the request's PID as a tag, preceded by noise on other
//! identifiers. Concurrent callers must each get back their own tag.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use obd_can::config::{DiagnosticsConfig, MockConfig};
use obd_can::obd::{mode, pid};
use obd_can::transport::MockTransport;
use obd_can::{Correlator, FrameTransport, ObdError, TransportError};
use obd_core::RawFrame;
use parking_lot::Mutex;
use tokio::sync::mpsc;

// =============================================================================
// Echo Transport
// =============================================================================

struct EchoTransport {
    tx: mpsc::Sender<RawFrame>,
    rx: Mutex<Option<mpsc::Receiver<RawFrame>>>,
    sent: AtomicUsize,
}

impl EchoTransport {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(1024);
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            sent: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl FrameTransport for EchoTransport {
    async fn send(&self, frame: &RawFrame) -> Result<(), TransportError> {
        let n = self.sent.fetch_add(1, Ordering::SeqCst);
        let (req_mode, tag) = (frame.data[1], frame.data[2]);

        // Noise first: another ECU and a wrong-mode frame on the right address
        let noise = [
            RawFrame::new(0x7E9, &[0x03, req_mode | 0x40, tag.wrapping_add(1), 0, 0, 0, 0, 0]),
            RawFrame::new(0x7E8, &[0x03, 0x7F, tag, 0x11, 0, 0, 0, 0]),
        ];
        for frame in noise.into_iter().take(n % 3) {
            self.tx
                .send(frame)
                .await
                .map_err(|_| TransportError::Closed)?;
        }

        // Yield so concurrent callers get a chance to interleave
        tokio::task::yield_now().await;

        self.tx
            .send(RawFrame::new(
                0x7E8,
                &[0x03, req_mode | 0x40, tag, 0, 0, 0, 0, 0],
            ))
            .await
            .map_err(|_| TransportError::Closed)
    }

    fn take_inbound(&self) -> Option<mpsc::Receiver<RawFrame>> {
        self.rx.lock().take()
    }

    async fn is_connected(&self) -> bool {
        true
    }

    async fn close(&self) {}
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_timeout_is_bounded_by_window() {
    let mock = Arc::new(MockTransport::new(&MockConfig {
        respond: false,
        ..Default::default()
    }));
    let correlator = Correlator::new(mock.clone(), &DiagnosticsConfig::default()).unwrap();

    let started = tokio::time::Instant::now();
    let result = correlator
        .exchange(&correlator.request(mode::STORED_DTCS, 0))
        .await;
    let elapsed = started.elapsed();

    match result {
        Err(ObdError::Timeout { mode, pid, timeout }) => {
            assert_eq!(mode, 0x03);
            assert_eq!(pid, 0x00);
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(120), "took {:?}", elapsed);

    // Exactly one frame per exchange, no retries
    assert_eq!(mock.sent_frames().len(), 1);
}

#[tokio::test]
async fn test_timeout_with_real_clock() {
    let mock = Arc::new(MockTransport::new(&MockConfig {
        respond: false,
        ..Default::default()
    }));
    let config = DiagnosticsConfig {
        exchange_timeout_ms: 50,
        ..Default::default()
    };
    let correlator = Correlator::new(mock, &config).unwrap();

    let started = std::time::Instant::now();
    let result = correlator
        .exchange(&correlator.request(mode::VEHICLE_INFO, 0x02))
        .await;

    assert!(matches!(result, Err(ObdError::Timeout { .. })));
    assert!(started.elapsed() < Duration::from_millis(50 + 250));
}

#[tokio::test(start_paused = true)]
async fn test_late_response_misses_window() {
    let mock = Arc::new(MockTransport::new(&MockConfig {
        latency_ms: 150,
        ..Default::default()
    }));
    let correlator = Correlator::new(mock, &DiagnosticsConfig::default()).unwrap();

    let result = correlator
        .exchange(&correlator.request(mode::VEHICLE_INFO, 0x02))
        .await;
    assert!(matches!(result, Err(ObdError::Timeout { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_late_answer_is_not_taken_for_next_pid() {
    let mock = Arc::new(MockTransport::new(&MockConfig {
        latency_ms: 150,
        ..Default::default()
    }));
    let correlator = Correlator::new(mock, &DiagnosticsConfig::default()).unwrap();

    let rpm = correlator
        .exchange(&correlator.request(mode::CURRENT_DATA, pid::ENGINE_RPM))
        .await;
    assert!(matches!(rpm, Err(ObdError::Timeout { .. })));

    // The rpm answer lands inside this window but echoes the wrong PID
    let speed = correlator
        .exchange(&correlator.request(mode::CURRENT_DATA, pid::VEHICLE_SPEED))
        .await;
    match speed {
        Err(ObdError::Timeout { pid, .. }) => assert_eq!(pid, 0x0D),
        other => panic!("expected timeout, got {:?}", other),
    }

    let backlog = correlator.drain_backlog();
    assert_eq!(backlog.len(), 1);
    assert_eq!(backlog[0].data[1..3], [0x41u8, 0x0C]);
}

#[tokio::test(start_paused = true)]
async fn test_drain_during_exchange_returns_set_aside_frames() {
    let mock = Arc::new(MockTransport::new(&MockConfig {
        latency_ms: 50,
        ..Default::default()
    }));
    let correlator =
        Arc::new(Correlator::new(mock.clone(), &DiagnosticsConfig::default()).unwrap());

    let exchange = {
        let correlator = correlator.clone();
        tokio::spawn(async move {
            correlator
                .exchange(&correlator.request(mode::VEHICLE_INFO, pid::VIN))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    mock.inject(RawFrame::new(0x321, &[0x01, 0x02]));
    tokio::time::sleep(Duration::from_millis(10)).await;

    // The exchange still owns the stream here
    assert!(!exchange.is_finished());
    let ids: Vec<u32> = correlator.drain_backlog().iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![0x321]);

    let response = exchange.await.unwrap().unwrap();
    assert_eq!(response.payload_text(), "KMHJ81");
    assert!(correlator.drain_backlog().is_empty());
}

#[tokio::test]
async fn test_set_aside_frames_are_capped_oldest_first() {
    let mock = Arc::new(MockTransport::new(&MockConfig::default()));
    let correlator = Correlator::new(mock.clone(), &DiagnosticsConfig::default()).unwrap();

    // Two rounds of 60 keep each round inside the inbound channel
    for round in 0..2u32 {
        for i in 0..60u32 {
            mock.inject(RawFrame::new(0x100 + round * 60 + i, &[0]));
        }
        correlator
            .exchange(&correlator.request(mode::VEHICLE_INFO, pid::ECU_NAME))
            .await
            .unwrap();
    }

    let ids: Vec<u32> = correlator.drain_backlog().iter().map(|f| f.id).collect();
    assert_eq!(ids.len(), 100);
    assert_eq!(ids[0], 0x100 + 20);
    assert_eq!(ids[99], 0x100 + 119);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_exchanges_never_cross_talk() {
    let transport = Arc::new(EchoTransport::new());
    let config = DiagnosticsConfig {
        exchange_timeout_ms: 1000,
        ..Default::default()
    };
    let correlator = Arc::new(Correlator::new(transport.clone(), &config).unwrap());

    const CALLERS: u8 = 8;
    const ROUNDS: u8 = 30;

    let mut handles = Vec::new();
    for caller in 0..CALLERS {
        let correlator = correlator.clone();
        handles.push(tokio::spawn(async move {
            for round in 0..ROUNDS {
                let tag = caller * ROUNDS + round;
                let response = correlator
                    .exchange(&correlator.request(mode::CURRENT_DATA, tag))
                    .await
                    .expect("exchange failed");
                assert_eq!(response.raw()[2], tag, "caller {} got another caller's response", caller);
            }
        }));
    }

    // A concurrent drain must never take a response away from an exchange
    let drainer = {
        let correlator = correlator.clone();
        tokio::spawn(async move {
            let mut drained = Vec::new();
            for _ in 0..200 {
                drained.extend(correlator.drain_backlog());
                tokio::task::yield_now().await;
            }
            drained
        })
    };

    for handle in handles {
        handle.await.unwrap();
    }
    let mut drained = drainer.await.unwrap();
    drained.extend(correlator.drain_backlog());

    assert_eq!(
        transport.sent.load(Ordering::SeqCst),
        CALLERS as usize * ROUNDS as usize
    );
    for frame in drained {
        let is_positive_answer = frame.id == 0x7E8 && frame.data[1] == 0x41;
        assert!(!is_positive_answer, "drain consumed a response: {}", frame);
    }
}
