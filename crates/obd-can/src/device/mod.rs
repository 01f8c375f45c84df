//! Scalar-command devices (RPM, speed, coolant temperature)
//!
//! The telemetry loop polls scalar channels through this boundary, which is
//! independent of the CAN correlator: an ELM327 adapter, mode 01 reads over
//! the shared correlator, or a simulator.

mod can;
mod elm327;
mod simulated;

pub use can::CanScalarDevice;
pub use elm327::{parse_mode01_response, Elm327Device};
pub use simulated::SimulatedDevice;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::DeviceConfig;
use crate::correlator::Correlator;
use crate::obd::ScalarChannel;

/// Errors raised by a scalar read
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device transport error: {0}")]
    Transport(String),

    #[error("Device did not answer in time")]
    Timeout,

    #[error("No data for {0}")]
    NoData(ScalarChannel),

    #[error("Malformed device response: {0}")]
    Malformed(String),

    #[error("Device unavailable: {0}")]
    Unavailable(String),
}

/// A request/response interface returning named scalar readings
#[async_trait]
pub trait ScalarDevice: Send + Sync {
    /// Read one channel as a physical value
    async fn read(&self, channel: ScalarChannel) -> Result<f64, DeviceError>;

    /// Short name for logging
    fn name(&self) -> &'static str;
}

/// Create a scalar device based on configuration.
///
/// The `can` device needs the correlator; `Ok(None)` means no device.
pub fn create_device(
    config: &DeviceConfig,
    correlator: Option<Arc<Correlator>>,
) -> Result<Option<Arc<dyn ScalarDevice>>, DeviceError> {
    match config {
        DeviceConfig::Elm327(cfg) => Ok(Some(Arc::new(Elm327Device::new(cfg)))),
        DeviceConfig::Can => match correlator {
            Some(correlator) => Ok(Some(Arc::new(CanScalarDevice::new(correlator)))),
            None => Err(DeviceError::Unavailable(
                "the can device requires a CAN transport".to_string(),
            )),
        },
        DeviceConfig::Simulated => Ok(Some(Arc::new(SimulatedDevice::new()))),
        DeviceConfig::None => Ok(None),
    }
}
