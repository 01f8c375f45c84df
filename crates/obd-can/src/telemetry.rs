//! Fixed-interval telemetry loop
//!
//! One tick: poll scalars, request trouble codes, drain the unsolicited
//! backlog, pick up the latest identity/maps, then hand the snapshot to the
//! broadcaster. Every step is best-effort; only cancellation ends the loop.

use std::sync::Arc;
use std::time::Duration;

use obd_core::{Broadcaster, EcuInfo, EngineMaps, Latest, ScalarReadings, TelemetrySnapshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::correlator::Correlator;
use crate::device::ScalarDevice;
use crate::obd::{decode_mode3_response, mode, ScalarChannel};

pub struct TelemetryLoop {
    device: Option<Arc<dyn ScalarDevice>>,
    correlator: Option<Arc<Correlator>>,
    identity: Arc<Latest<EcuInfo>>,
    maps: Arc<Latest<EngineMaps>>,
    broadcaster: Arc<Broadcaster>,
    readings: ScalarReadings,
    seq: u64,
}

impl TelemetryLoop {
    pub fn new(
        device: Option<Arc<dyn ScalarDevice>>,
        correlator: Option<Arc<Correlator>>,
        identity: Arc<Latest<EcuInfo>>,
        maps: Arc<Latest<EngineMaps>>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            device,
            correlator,
            identity,
            maps,
            broadcaster,
            readings: ScalarReadings::default(),
            seq: 0,
        }
    }

    /// Assemble one snapshot (steps 1-4 of a tick)
    pub async fn tick(&mut self) -> TelemetrySnapshot {
        let mut snapshot = TelemetrySnapshot::new(self.seq);
        self.seq += 1;

        self.poll_scalars().await;
        snapshot.readings = self.readings;

        if let Some(correlator) = &self.correlator {
            let request = correlator.request(mode::STORED_DTCS, 0);
            match correlator.exchange(&request).await {
                Ok(response) => snapshot.dtcs = decode_mode3_response(response.raw()),
                Err(e) => debug!(error = %e, "Trouble-code request failed"),
            }

            snapshot.unsolicited_frames = correlator.drain_backlog();
        }

        snapshot.ecu_info = self.identity.get();
        snapshot.engine_maps = self.maps.get();
        snapshot
    }

    /// Failed reads keep the previous tick's value
    async fn poll_scalars(&mut self) {
        let Some(device) = &self.device else {
            return;
        };

        for channel in ScalarChannel::ALL {
            match device.read(channel).await {
                Ok(value) => match channel {
                    ScalarChannel::Rpm => self.readings.rpm = value,
                    ScalarChannel::Speed => self.readings.speed = value,
                    ScalarChannel::CoolantTemperature => self.readings.temperature = value,
                },
                Err(e) => debug!(device = device.name(), %channel, error = %e, "Scalar read failed"),
            }
        }
    }

    /// Run one tick and publish it
    pub async fn tick_and_publish(&mut self) -> usize {
        let snapshot = self.tick().await;
        self.broadcaster.publish(&snapshot).await
    }

    /// Tick at `interval` until cancelled; a tick in progress always completes
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_ms = interval.as_millis() as u64, "Telemetry loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.tick_and_publish().await;
        }
        info!(ticks = self.seq, "Telemetry loop stopped");
    }
}
