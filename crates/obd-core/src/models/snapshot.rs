//! Telemetry snapshot model

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EcuInfo, EngineMaps, RawFrame, TroubleCode};

/// Scalar readings polled once per tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalarReadings {
    /// Engine speed (rpm)
    pub rpm: f64,
    /// Vehicle speed (km/h)
    pub speed: f64,
    /// Coolant temperature (°C)
    #[serde(rename = "temp")]
    pub temperature: f64,
}

/// One complete telemetry reading assembled for a single broadcast tick.
///
/// Built fresh every tick and never mutated once handed to the broadcaster.
/// Identity and maps are shared with the refresh task by `Arc`, so a
/// snapshot always points at a fully built instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// Tick sequence number
    pub seq: u64,
    /// When the snapshot was assembled
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub readings: ScalarReadings,
    /// Trouble codes reported this tick (empty if the request failed)
    pub dtcs: Vec<TroubleCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ecu_info: Option<Arc<EcuInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_maps: Option<Arc<EngineMaps>>,
    /// Frames that arrived on the bus without being claimed by an exchange
    #[serde(rename = "canFrames", skip_serializing_if = "Vec::is_empty", default)]
    pub unsolicited_frames: Vec<RawFrame>,
}

impl TelemetrySnapshot {
    /// Empty snapshot with the given sequence number
    pub fn new(seq: u64) -> Self {
        Self {
            seq,
            timestamp: Utc::now(),
            readings: ScalarReadings::default(),
            dtcs: Vec::new(),
            ecu_info: None,
            engine_maps: None,
            unsolicited_frames: Vec::new(),
        }
    }
}
