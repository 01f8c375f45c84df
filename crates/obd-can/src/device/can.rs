//! Mode 01 scalar reads through the shared correlator

use std::sync::Arc;

use async_trait::async_trait;

use super::{DeviceError, ScalarDevice};
use crate::correlator::Correlator;
use crate::error::ObdError;
use crate::obd::{mode, ScalarChannel};

pub struct CanScalarDevice {
    correlator: Arc<Correlator>,
}

impl CanScalarDevice {
    pub fn new(correlator: Arc<Correlator>) -> Self {
        Self { correlator }
    }
}

#[async_trait]
impl ScalarDevice for CanScalarDevice {
    async fn read(&self, channel: ScalarChannel) -> Result<f64, DeviceError> {
        let request = self.correlator.request(mode::CURRENT_DATA, channel.pid());
        let response = self
            .correlator
            .exchange(&request)
            .await
            .map_err(|e| match e {
                ObdError::Timeout { .. } => DeviceError::Timeout,
                ObdError::Transport(e) => DeviceError::Transport(e.to_string()),
                ObdError::MalformedResponse(msg) => DeviceError::Malformed(msg),
            })?;

        // [len, 0x41, pid, A, B, ..]
        let raw = response.raw();
        if raw.get(2) != Some(&channel.pid()) {
            return Err(DeviceError::Malformed(format!(
                "answer for pid {:02X?}, expected 0x{:02X}",
                raw.get(2),
                channel.pid()
            )));
        }

        channel
            .decode(&raw[3..])
            .ok_or_else(|| DeviceError::Malformed(format!("short answer for {}", channel)))
    }

    fn name(&self) -> &'static str {
        "can"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiagnosticsConfig, MockConfig};
    use crate::transport::MockTransport;
    use obd_core::ScalarReadings;

    #[tokio::test]
    async fn test_reads_mode01_values_from_mock_ecu() {
        let mock = Arc::new(MockTransport::new(&MockConfig::default()));
        mock.set_readings(ScalarReadings {
            rpm: 2250.0,
            speed: 64.0,
            temperature: 87.0,
        });
        let correlator = Arc::new(Correlator::new(mock, &DiagnosticsConfig::default()).unwrap());
        let device = CanScalarDevice::new(correlator);

        assert_eq!(device.read(ScalarChannel::Rpm).await, Ok(2250.0));
        assert_eq!(device.read(ScalarChannel::Speed).await, Ok(64.0));
        assert_eq!(device.read(ScalarChannel::CoolantTemperature).await, Ok(87.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silenced_pid_times_out() {
        let mock = Arc::new(MockTransport::new(&MockConfig::default()));
        mock.silence(mode::CURRENT_DATA, ScalarChannel::Speed.pid());
        let correlator =
            Arc::new(Correlator::new(mock.clone(), &DiagnosticsConfig::default()).unwrap());
        let device = CanScalarDevice::new(correlator);

        assert_eq!(device.read(ScalarChannel::Speed).await, Err(DeviceError::Timeout));
    }
}
