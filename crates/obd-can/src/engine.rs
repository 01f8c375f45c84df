//! Engine wiring: periodic tasks and cooperative shutdown

use std::sync::Arc;
use std::time::Duration;

use obd_core::{Broadcaster, EcuInfo, EngineMaps, Latest, RawFrame};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::correlator::Correlator;
use crate::device::{create_device, ScalarDevice};
use crate::error::ConfigError;
use crate::telemetry::TelemetryLoop;
use crate::transport::{create_transport, FrameTransport};
use crate::walker::{WalkError, Walker};

/// Identifier of the periodic bus test frame
pub const TEST_FRAME_ID: u32 = 0x123;

/// Payload of the periodic bus test frame
pub const TEST_FRAME_DATA: [u8; 8] = [b'T', b'E', b'S', b'T', 0, 0, 0, 0];

/// Assembled protocol engine, ready to spawn
pub struct DiagnosticEngine {
    config: EngineConfig,
    transport: Option<Arc<dyn FrameTransport>>,
    correlator: Option<Arc<Correlator>>,
    device: Option<Arc<dyn ScalarDevice>>,
    broadcaster: Arc<Broadcaster>,
    identity: Arc<Latest<EcuInfo>>,
    maps: Arc<Latest<EngineMaps>>,
}

impl DiagnosticEngine {
    /// Build the engine from configuration.
    ///
    /// A bus that cannot be opened is not fatal: CAN features are disabled
    /// for the session and the engine runs in degraded mode.
    pub async fn from_config(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let transport = match create_transport(&config.transport).await {
            Ok(transport) => transport,
            Err(e) => {
                warn!(error = %e, "CAN transport unavailable, CAN features disabled");
                None
            }
        };

        Ok(Self::new(config, transport))
    }

    /// Build the engine around an already opened transport
    pub fn new(config: EngineConfig, transport: Option<Arc<dyn FrameTransport>>) -> Self {
        let correlator = match &transport {
            Some(transport) => match Correlator::new(transport.clone(), &config.diagnostics) {
                Ok(correlator) => Some(Arc::new(correlator)),
                Err(e) => {
                    warn!(error = %e, "Cannot attach correlator, CAN features disabled");
                    None
                }
            },
            None => {
                info!("No CAN transport configured");
                None
            }
        };

        let device = match create_device(&config.device, correlator.clone()) {
            Ok(device) => device,
            Err(e) => {
                warn!(error = %e, "Scalar device unavailable, readings disabled");
                None
            }
        };

        let broadcaster = Arc::new(Broadcaster::with_write_timeout(
            config.telemetry.subscriber_write_timeout(),
        ));

        Self {
            config,
            transport,
            correlator,
            device,
            broadcaster,
            identity: Arc::new(Latest::new()),
            maps: Arc::new(Latest::new()),
        }
    }

    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        self.broadcaster.clone()
    }

    pub fn correlator(&self) -> Option<Arc<Correlator>> {
        self.correlator.clone()
    }

    pub fn has_can(&self) -> bool {
        self.correlator.is_some()
    }

    /// Start the telemetry loop, the identity/map refresh and the optional
    /// test-frame emitter
    pub fn spawn(self, cancel: CancellationToken) -> EngineHandle {
        let telemetry = &self.config.telemetry;
        let mut tasks = Vec::new();

        let telemetry_loop = TelemetryLoop::new(
            self.device.clone(),
            self.correlator.clone(),
            self.identity.clone(),
            self.maps.clone(),
            self.broadcaster.clone(),
        );
        tasks.push(tokio::spawn(
            telemetry_loop.run(telemetry.interval(), cancel.clone()),
        ));

        if let Some(correlator) = &self.correlator {
            let walker = Walker::new(correlator.clone()).with_cancel(cancel.clone());
            tasks.push(tokio::spawn(refresh_loop(
                walker,
                self.identity.clone(),
                self.maps.clone(),
                telemetry.refresh_interval(),
                cancel.clone(),
            )));

            if let Some(interval) = telemetry.test_frame_interval() {
                tasks.push(tokio::spawn(test_frame_loop(
                    correlator.clone(),
                    interval,
                    cancel.clone(),
                )));
            }
        }

        info!(
            tasks = tasks.len(),
            can = self.correlator.is_some(),
            device = self.device.as_ref().map(|d| d.name()).unwrap_or("none"),
            "Diagnostic engine started"
        );

        EngineHandle {
            cancel,
            tasks,
            broadcaster: self.broadcaster,
            transport: self.transport,
            identity: self.identity,
            maps: self.maps,
        }
    }
}

/// Refresh identity and maps now, then every `interval`
async fn refresh_loop(
    walker: Walker,
    identity: Arc<Latest<EcuInfo>>,
    maps: Arc<Latest<EngineMaps>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut bus_down_reported = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = async {
            identity.publish(walker.refresh_identity().await?);
            maps.publish(walker.refresh_maps().await?);
            Ok::<_, WalkError>(())
        }
        .await;

        match result {
            Ok(()) => bus_down_reported = false,
            Err(WalkError::Cancelled) => break,
            Err(WalkError::Transport(e)) if !bus_down_reported => {
                warn!(error = %e, "Identity/map refresh failed on transport error");
                bus_down_reported = true;
            }
            Err(WalkError::Transport(e)) => {
                debug!(error = %e, "Identity/map refresh still failing");
            }
        }
    }
    debug!("Refresh loop stopped");
}

/// Write the bus test frame every `interval`
async fn test_frame_loop(
    correlator: Arc<Correlator>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let frame = RawFrame::new(TEST_FRAME_ID, &TEST_FRAME_DATA);
        if let Err(e) = correlator.send_raw(&frame).await {
            debug!(error = %e, "Failed to send test frame");
        }
    }
    debug!("Test-frame loop stopped");
}

/// Running engine; dropping it does not stop the tasks, call [`shutdown`](Self::shutdown)
pub struct EngineHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    broadcaster: Arc<Broadcaster>,
    transport: Option<Arc<dyn FrameTransport>>,
    identity: Arc<Latest<EcuInfo>>,
    maps: Arc<Latest<EngineMaps>>,
}

impl EngineHandle {
    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        self.broadcaster.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Latest completed identity, if a refresh has finished
    pub fn identity(&self) -> Option<Arc<EcuInfo>> {
        self.identity.get()
    }

    /// Latest completed engine maps, if a refresh has finished
    pub fn maps(&self) -> Option<Arc<EngineMaps>> {
        self.maps.get()
    }

    /// Stop scheduling, wait for in-flight work, close subscribers, release the bus
    pub async fn shutdown(self) {
        info!("Shutting down diagnostic engine");
        self.cancel.cancel();

        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Engine task ended abnormally");
            }
        }

        self.broadcaster.close_all().await;

        if let Some(transport) = &self.transport {
            transport.close().await;
        }
        info!("Diagnostic engine stopped");
    }
}
