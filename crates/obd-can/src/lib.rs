//! obd-can - OBD-II diagnostic protocol engine
//!
//! This crate turns a noisy stream of inbound bus frames into correlated
//! request/response exchanges and produces telemetry snapshots from them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     DiagnosticEngine                          │
//! │  Spawns the periodic tasks, owns the cancellation token       │
//! │                                                              │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//! │  │TelemetryLoop │   │   Walker     │   │ test-frame task  │  │
//! │  │ (1 s tick)   │   │ (30 s walk)  │   │  (optional)      │  │
//! │  └──────┬───────┘   └──────┬───────┘   └────────┬─────────┘  │
//! │         │  ScalarDevice    │                    │            │
//! │         └────────┬─────────┘                    │            │
//! │            ┌─────┴──────┐                       │            │
//! │            │ Correlator │  (one exchange at a time)          │
//! │            └─────┬──────┘                       │            │
//! │           ┌──────┴──────────────────────────────┴──┐         │
//! │           │       FrameTransport (CAN / mock)       │         │
//! │           └─────────────────────────────────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod correlator;
pub mod device;
pub mod engine;
pub mod error;
pub mod obd;
pub mod telemetry;
pub mod transport;
pub mod walker;

pub use config::{
    DeviceConfig, DiagnosticsConfig, EngineConfig, MockConfig, TelemetryConfig, TransportConfig,
};
pub use correlator::Correlator;
pub use device::{create_device, DeviceError, ScalarDevice};
pub use engine::{DiagnosticEngine, EngineHandle};
pub use error::{ConfigError, ObdError};
pub use obd::{CorrelationRequest, DiagnosticRequest, DiagnosticResponse, ScalarChannel};
pub use telemetry::TelemetryLoop;
pub use transport::{create_transport, FrameTransport, TransportError};
pub use walker::{WalkError, Walker};
