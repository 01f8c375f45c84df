//! ECU identity and engine map walks
//!
//! Both walks are built from many independent exchanges. A timed-out or
//! malformed answer only leaves its field or cell unset; a transport failure
//! aborts the walk.

use std::sync::Arc;

use obd_core::{EcuInfo, EngineMap, EngineMaps, MapKind, MAP_SIZE};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::correlator::Correlator;
use crate::error::ObdError;
use crate::obd::{mode, pid, DiagnosticResponse};
use crate::transport::TransportError;

/// Map cell raw values are hundredths.
// NOTE: not an ISO 15031 scaling; kept as the ECU firmware reports it.
const MAP_VALUE_SCALE: f64 = 100.0;

/// Minimum declared length of a map cell answer `[len, 0x49, pid, hi, lo]`
const MAP_CELL_MIN_LEN: usize = 5;

/// Errors that abort a walk
#[derive(Debug, Error, Clone)]
pub enum WalkError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Walk cancelled")]
    Cancelled,
}

/// Identity field filled by one mode 09 sub-query
#[derive(Debug, Clone, Copy)]
enum IdentityField {
    Vin,
    Version,
    CalibrationId,
    Protocol,
    Hardware,
}

impl IdentityField {
    fn set(self, info: &mut EcuInfo, value: String) {
        let slot = match self {
            IdentityField::Vin => &mut info.vin,
            IdentityField::Version => &mut info.version,
            IdentityField::CalibrationId => &mut info.calibration_id,
            IdentityField::Protocol => &mut info.protocol,
            IdentityField::Hardware => &mut info.hardware,
        };
        *slot = Some(value);
    }
}

const IDENTITY_QUERIES: [(u8, IdentityField); 5] = [
    (pid::VIN, IdentityField::Vin),
    (pid::ECU_NAME, IdentityField::Version),
    (pid::CALIBRATION_ID, IdentityField::CalibrationId),
    (pid::PROTOCOL, IdentityField::Protocol),
    (pid::HARDWARE, IdentityField::Hardware),
];

fn map_pid(kind: MapKind) -> u8 {
    match kind {
        MapKind::Fuel => pid::FUEL_MAP,
        MapKind::Timing => pid::TIMING_MAP,
    }
}

/// Decode a map cell answer into its physical value
pub fn parse_map_cell(response: &DiagnosticResponse) -> Option<f64> {
    if response.declared_len() < MAP_CELL_MIN_LEN {
        return None;
    }
    let raw = response.raw();
    let value = u16::from_be_bytes([raw[3], raw[4]]);
    Some(value as f64 / MAP_VALUE_SCALE)
}

/// Walks identity and calibration maps through the correlator
pub struct Walker {
    correlator: Arc<Correlator>,
    cancel: CancellationToken,
}

impl Walker {
    pub fn new(correlator: Arc<Correlator>) -> Self {
        Self {
            correlator,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between exchanges once `cancel` fires
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn check_cancelled(&self) -> Result<(), WalkError> {
        if self.cancel.is_cancelled() {
            return Err(WalkError::Cancelled);
        }
        Ok(())
    }

    /// Build a fresh identity from the five mode 09 sub-queries.
    ///
    /// Fields whose query times out or answers malformed stay unset.
    pub async fn refresh_identity(&self) -> Result<EcuInfo, WalkError> {
        let mut info = EcuInfo::default();

        for (info_pid, field) in IDENTITY_QUERIES {
            self.check_cancelled()?;

            let request = self.correlator.request(mode::VEHICLE_INFO, info_pid);
            match self.correlator.exchange(&request).await {
                Ok(response) => {
                    let text = response.payload_text();
                    if text.is_empty() {
                        debug!(?field, "Empty identity answer");
                    } else {
                        field.set(&mut info, text);
                    }
                }
                Err(ObdError::Transport(e)) => return Err(e.into()),
                Err(e) => debug!(?field, error = %e, "Identity sub-query failed"),
            }
        }

        debug!(fields = info.populated_fields(), "Identity refresh complete");
        Ok(info)
    }

    /// Walk all 16x16 cells of one map; unanswered cells stay at zero
    pub async fn refresh_map(&self, kind: MapKind) -> Result<EngineMap, WalkError> {
        let map_pid = map_pid(kind);
        let mut map = EngineMap::new();
        let mut missed = 0usize;

        for row in 0..MAP_SIZE {
            for col in 0..MAP_SIZE {
                self.check_cancelled()?;

                let request =
                    self.correlator
                        .cell_request(mode::VEHICLE_INFO, map_pid, row as u8, col as u8);
                match self.correlator.exchange(&request).await {
                    Ok(response) => match parse_map_cell(&response) {
                        Some(value) => map.set(row, col, value),
                        None => missed += 1,
                    },
                    Err(ObdError::Transport(e)) => return Err(e.into()),
                    Err(_) => missed += 1,
                }
            }
        }

        if missed > 0 {
            debug!(map = %kind, missed, "Map cells left unset");
        }
        Ok(map)
    }

    /// Walk the fuel and timing maps
    pub async fn refresh_maps(&self) -> Result<EngineMaps, WalkError> {
        let mut maps = EngineMaps::default();
        for kind in MapKind::ALL {
            *maps.get_mut(kind) = self.refresh_map(kind).await?;
        }
        info!(
            fuel_cells = maps.fuel.filled_cells(),
            timing_cells = maps.timing.filled_cells(),
            "Engine maps refreshed"
        );
        Ok(maps)
    }
}
