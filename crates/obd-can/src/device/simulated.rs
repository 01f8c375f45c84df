//! Simulated scalar device for demos without a vehicle

use std::ops::RangeInclusive;

use async_trait::async_trait;
use rand::Rng;

use super::{DeviceError, ScalarDevice};
use crate::obd::ScalarChannel;

const RPM_RANGE: RangeInclusive<f64> = 800.0..=3000.0;
const SPEED_RANGE: RangeInclusive<f64> = 0.0..=120.0;
const TEMP_RANGE: RangeInclusive<f64> = 80.0..=95.0;

/// Returns uniformly random values in plausible ranges
#[derive(Debug, Default)]
pub struct SimulatedDevice;

impl SimulatedDevice {
    pub fn new() -> Self {
        Self
    }

    pub fn range(channel: ScalarChannel) -> RangeInclusive<f64> {
        match channel {
            ScalarChannel::Rpm => RPM_RANGE,
            ScalarChannel::Speed => SPEED_RANGE,
            ScalarChannel::CoolantTemperature => TEMP_RANGE,
        }
    }
}

#[async_trait]
impl ScalarDevice for SimulatedDevice {
    async fn read(&self, channel: ScalarChannel) -> Result<f64, DeviceError> {
        let value = rand::thread_rng().gen_range(Self::range(channel));
        Ok(value.round())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_stay_in_range() {
        let device = SimulatedDevice::new();
        for _ in 0..200 {
            for channel in ScalarChannel::ALL {
                let value = device.read(channel).await.unwrap();
                assert!(SimulatedDevice::range(channel).contains(&value), "{channel}: {value}");
            }
        }
    }
}
