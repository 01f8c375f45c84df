//! Mock transport with an in-process simulated engine ECU

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use obd_core::{RawFrame, ScalarReadings, TroubleCode};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::adapter::{push_inbound, InboundChannel};
use super::{FrameTransport, TransportError};
use crate::config::MockConfig;
use crate::obd::{encode_trouble_code, mode, pid, ScalarChannel, ACK_OFFSET, OBD_FUNCTIONAL_ID};

/// Physical request identifiers (tester -> ECU #1..#8)
const PHYSICAL_REQUEST_IDS: std::ops::RangeInclusive<u32> = 0x7E0..=0x7E7;

/// Trouble codes that fit in one single-frame mode 03 answer
const MAX_DTCS_PER_FRAME: usize = 3;

/// Mock frame transport for testing and demo setups
///
/// Every frame sent to the functional or a physical request identifier is
/// answered (after the configured latency) on `response_id`, unless the
/// request's `(mode, pid)` has been silenced. Mode 03 requests carry pid 0.
pub struct MockTransport {
    config: MockConfig,
    connected: AtomicBool,
    inbound: InboundChannel,
    sent: RwLock<Vec<RawFrame>>,
    silenced: RwLock<HashSet<(u8, u8)>>,
    dtcs: RwLock<Vec<TroubleCode>>,
    readings: RwLock<ScalarReadings>,
}

impl MockTransport {
    pub fn new(config: &MockConfig) -> Self {
        Self {
            config: config.clone(),
            connected: AtomicBool::new(true),
            inbound: InboundChannel::new(),
            sent: RwLock::new(Vec::new()),
            silenced: RwLock::new(HashSet::new()),
            dtcs: RwLock::new(config.dtcs.clone()),
            readings: RwLock::new(ScalarReadings {
                rpm: 850.0,
                speed: 0.0,
                temperature: 90.0,
            }),
        }
    }

    /// Stop answering a `(mode, pid)` pair
    pub fn silence(&self, mode: u8, pid: u8) {
        self.silenced.write().insert((mode, pid));
    }

    /// Replace the stored trouble codes
    pub fn set_dtcs(&self, dtcs: Vec<TroubleCode>) {
        *self.dtcs.write() = dtcs;
    }

    /// Replace the mode 01 values
    pub fn set_readings(&self, readings: ScalarReadings) {
        *self.readings.write() = readings;
    }

    /// Inject an unsolicited inbound frame (simulates other bus traffic)
    pub fn inject(&self, frame: RawFrame) {
        push_inbound(&self.inbound.sender(), frame);
    }

    /// Every frame written so far, oldest first
    pub fn sent_frames(&self) -> Vec<RawFrame> {
        self.sent.read().clone()
    }

    /// Set connection state
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Raw 16-bit value the simulated ECU reports for a map cell
    pub fn map_cell_raw(map_pid: u8, row: u8, col: u8) -> u16 {
        let (row, col) = (row as u16, col as u16);
        match map_pid {
            pid::FUEL_MAP => 1000 + row * 40 + col * 25,
            _ => 500 + row * 10 + col * 60,
        }
    }

    /// Identity string reported for a mode 09 identity PID
    pub fn identity_text(info_pid: u8) -> Option<&'static str> {
        match info_pid {
            pid::VIN => Some("KMHJ81"),
            pid::CALIBRATION_ID => Some("CAL123"),
            pid::HARDWARE => Some("HW0042"),
            pid::ECU_NAME => Some("ECM-V2"),
            pid::PROTOCOL => Some("ISO157"),
            _ => None,
        }
    }

    fn is_request(&self, frame: &RawFrame) -> bool {
        frame.id == OBD_FUNCTIONAL_ID || PHYSICAL_REQUEST_IDS.contains(&frame.id)
    }

    fn build_response(&self, request: &RawFrame) -> Option<RawFrame> {
        let data = &request.data;
        if data.len() < 3 {
            return None;
        }

        let (req_mode, req_pid) = (data[1], data[2]);
        if self.silenced.read().contains(&(req_mode, req_pid)) {
            return None;
        }

        let ack = req_mode | ACK_OFFSET;
        let payload: Vec<u8> = match req_mode {
            mode::VEHICLE_INFO => match req_pid {
                pid::FUEL_MAP | pid::TIMING_MAP => {
                    let row = data.get(3).copied().unwrap_or(0);
                    let col = data.get(4).copied().unwrap_or(0);
                    let [hi, lo] = Self::map_cell_raw(req_pid, row, col).to_be_bytes();
                    vec![0x05, ack, req_pid, hi, lo]
                }
                _ => {
                    let text = Self::identity_text(req_pid)?.as_bytes();
                    let mut payload = vec![(2 + text.len()) as u8, ack];
                    payload.extend_from_slice(text);
                    payload
                }
            },
            mode::STORED_DTCS => {
                let dtcs = self.dtcs.read();
                let count = dtcs.len().min(MAX_DTCS_PER_FRAME);
                let mut payload = vec![(2 + count * 2) as u8, ack];
                for code in dtcs.iter().take(count) {
                    payload.extend_from_slice(&encode_trouble_code(code));
                }
                payload
            }
            mode::CURRENT_DATA => {
                let channel = ScalarChannel::ALL
                    .into_iter()
                    .find(|c| c.pid() == req_pid)?;
                let readings = *self.readings.read();
                let value = match channel {
                    ScalarChannel::Rpm => readings.rpm,
                    ScalarChannel::Speed => readings.speed,
                    ScalarChannel::CoolantTemperature => readings.temperature,
                };
                let bytes = channel.encode(value);
                let mut payload = vec![(2 + bytes.len()) as u8, ack, req_pid];
                payload.extend_from_slice(&bytes);
                payload
            }
            _ => return None,
        };

        let mut frame_data = [0u8; 8];
        frame_data[..payload.len()].copy_from_slice(&payload);
        Some(RawFrame::new(self.config.response_id, &frame_data))
    }
}

#[async_trait]
impl FrameTransport for MockTransport {
    async fn send(&self, frame: &RawFrame) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        tracing::debug!(frame = %frame, "Mock transport: sent frame");
        self.sent.write().push(frame.clone());

        if !self.config.respond || !self.is_request(frame) {
            return Ok(());
        }

        let Some(response) = self.build_response(frame) else {
            return Ok(());
        };

        let tx = self.inbound.sender();
        if self.config.latency_ms > 0 {
            let latency = Duration::from_millis(self.config.latency_ms);
            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                push_inbound(&tx, response);
            });
        } else {
            push_inbound(&tx, response);
        }

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
        tracing::debug!("Mock transport closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obd::{decode_mode3_response, DiagnosticRequest, DiagnosticResponse};

    fn mock() -> MockTransport {
        MockTransport::new(&MockConfig::default())
    }

    #[tokio::test]
    async fn test_identity_answer_parses_as_text() {
        let transport = mock();
        let mut rx = transport.take_inbound().unwrap();
        assert!(transport.take_inbound().is_none());

        let request = DiagnosticRequest::new(OBD_FUNCTIONAL_ID, mode::VEHICLE_INFO, pid::VIN);
        transport.send(&request.to_frame()).await.unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.id, 0x7E8);
        let response = DiagnosticResponse::decode(&frame, mode::VEHICLE_INFO).unwrap();
        assert_eq!(response.payload_text(), "KMHJ81");
    }

    #[tokio::test]
    async fn test_dtc_answer_round_trips_configured_codes() {
        let transport = mock();
        let mut rx = transport.take_inbound().unwrap();

        let request = DiagnosticRequest::new(OBD_FUNCTIONAL_ID, mode::STORED_DTCS, 0);
        transport.send(&request.to_frame()).await.unwrap();

        let frame = rx.recv().await.unwrap();
        let codes: Vec<String> = decode_mode3_response(&frame.data)
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(codes, vec!["P0087", "P0191", "P0401"]);
    }

    #[tokio::test]
    async fn test_silenced_and_foreign_frames_get_no_answer() {
        let transport = mock();
        let mut rx = transport.take_inbound().unwrap();
        transport.silence(mode::VEHICLE_INFO, pid::VIN);

        let request = DiagnosticRequest::new(OBD_FUNCTIONAL_ID, mode::VEHICLE_INFO, pid::VIN);
        transport.send(&request.to_frame()).await.unwrap();
        transport.send(&RawFrame::new(0x123, b"TEST")).await.unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(transport.sent_frames().len(), 2);
    }

    #[tokio::test]
    async fn test_injected_frames_reach_inbound() {
        let transport = mock();
        let mut rx = transport.take_inbound().unwrap();

        transport.inject(RawFrame::new(0x3B0, &[1, 2, 3]));
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.id, 0x3B0);
        assert_eq!(frame.data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_sends() {
        let transport = mock();
        transport.close().await;

        assert!(!transport.is_connected().await);
        let result = transport.send(&RawFrame::new(0x7DF, &[0x02, 0x03])).await;
        assert_eq!(result, Err(TransportError::Closed));
    }
}
