//! OBD-II request/response layer
//!
//! Single-frame requests only; there is no ISO-TP reassembly.

pub mod dtc;
mod request;

pub use dtc::{decode_mode3_response, decode_pair, encode_trouble_code};
pub use request::{CorrelationRequest, DiagnosticRequest, DiagnosticResponse};

/// Functional (broadcast) diagnostic request identifier
pub const OBD_FUNCTIONAL_ID: u32 = 0x7DF;

/// Standard response identifier of the engine ECU
pub const OBD_ECU_RESPONSE_ID: u32 = 0x7E8;

/// Positive response mode = request mode + 0x40
pub const ACK_OFFSET: u8 = 0x40;

/// Diagnostic service (mode) selectors
pub mod mode {
    /// Show current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Show stored trouble codes
    pub const STORED_DTCS: u8 = 0x03;
    /// Request vehicle information
    pub const VEHICLE_INFO: u8 = 0x09;
}

/// Parameter identifiers used by this gateway
pub mod pid {
    /// Mode 01: engine coolant temperature
    pub const COOLANT_TEMP: u8 = 0x05;
    /// Mode 01: engine speed
    pub const ENGINE_RPM: u8 = 0x0C;
    /// Mode 01: vehicle speed
    pub const VEHICLE_SPEED: u8 = 0x0D;

    /// Mode 09: vehicle identification number
    pub const VIN: u8 = 0x02;
    /// Mode 09: calibration id
    pub const CALIBRATION_ID: u8 = 0x04;
    /// Mode 09: hardware number
    pub const HARDWARE: u8 = 0x08;
    /// Mode 09: ECU name / version
    pub const ECU_NAME: u8 = 0x0A;
    /// Mode 09: protocol version
    pub const PROTOCOL: u8 = 0x0C;
    /// Mode 09: fuel map cell (row, col follow)
    pub const FUEL_MAP: u8 = 0x0E;
    /// Mode 09: ignition timing map cell (row, col follow)
    pub const TIMING_MAP: u8 = 0x0F;
}

/// Scalar channels polled once per telemetry tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarChannel {
    Rpm,
    Speed,
    CoolantTemperature,
}

impl ScalarChannel {
    pub const ALL: [ScalarChannel; 3] = [
        ScalarChannel::Rpm,
        ScalarChannel::Speed,
        ScalarChannel::CoolantTemperature,
    ];

    /// Mode 01 PID for this channel
    pub fn pid(&self) -> u8 {
        match self {
            ScalarChannel::Rpm => pid::ENGINE_RPM,
            ScalarChannel::Speed => pid::VEHICLE_SPEED,
            ScalarChannel::CoolantTemperature => pid::COOLANT_TEMP,
        }
    }

    /// Number of data bytes (A, B, ...) the PID answers with
    pub fn data_len(&self) -> usize {
        match self {
            ScalarChannel::Rpm => 2,
            ScalarChannel::Speed | ScalarChannel::CoolantTemperature => 1,
        }
    }

    /// Decode the data bytes following the PID echo
    pub fn decode(&self, data: &[u8]) -> Option<f64> {
        if data.len() < self.data_len() {
            return None;
        }
        let value = match self {
            ScalarChannel::Rpm => (256.0 * data[0] as f64 + data[1] as f64) / 4.0,
            ScalarChannel::Speed => data[0] as f64,
            ScalarChannel::CoolantTemperature => data[0] as f64 - 40.0,
        };
        Some(value)
    }

    /// Encode a physical value into data bytes (inverse of [`decode`](Self::decode))
    pub fn encode(&self, value: f64) -> Vec<u8> {
        match self {
            ScalarChannel::Rpm => {
                let raw = (value * 4.0).clamp(0.0, u16::MAX as f64) as u16;
                raw.to_be_bytes().to_vec()
            }
            ScalarChannel::Speed => vec![value.clamp(0.0, 255.0) as u8],
            ScalarChannel::CoolantTemperature => vec![(value + 40.0).clamp(0.0, 255.0) as u8],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarChannel::Rpm => "rpm",
            ScalarChannel::Speed => "speed",
            ScalarChannel::CoolantTemperature => "temp",
        }
    }
}

impl std::fmt::Display for ScalarChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_decoding() {
        assert_eq!(ScalarChannel::Rpm.decode(&[0x0B, 0xB8]), Some(750.0));
        assert_eq!(ScalarChannel::Speed.decode(&[0x3C]), Some(60.0));
        assert_eq!(ScalarChannel::CoolantTemperature.decode(&[0x5A]), Some(50.0));
        assert_eq!(ScalarChannel::Rpm.decode(&[0x0B]), None);
    }

    #[test]
    fn test_scalar_encoding_inverts_decoding() {
        for (channel, value) in [
            (ScalarChannel::Rpm, 2250.0),
            (ScalarChannel::Speed, 88.0),
            (ScalarChannel::CoolantTemperature, 91.0),
        ] {
            let bytes = channel.encode(value);
            assert_eq!(bytes.len(), channel.data_len());
            assert_eq!(channel.decode(&bytes), Some(value));
        }
    }
}
