//! Shared data models for the telemetry gateway

mod dtc;
mod ecu;
mod frame;
mod map;
mod snapshot;

pub use dtc::*;
pub use ecu::*;
pub use frame::*;
pub use map::*;
pub use snapshot::*;
