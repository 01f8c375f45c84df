//! Protocol engine configuration
//!
//! Every section is defaulted, so an empty document yields a runnable
//! mock setup.

use std::time::Duration;

use obd_core::TroubleCode;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::obd::{OBD_ECU_RESPONSE_ID, OBD_FUNCTIONAL_ID};

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl EngineConfig {
    /// Reject values that would stall or spin the periodic tasks
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.diagnostics.exchange_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "diagnostics.exchange_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.telemetry.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "telemetry.interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.telemetry.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "telemetry.refresh_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.telemetry.test_frame_interval_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "telemetry.test_frame_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.telemetry.subscriber_write_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "telemetry.subscriber_write_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if let DeviceConfig::Elm327(elm) = &self.device {
            if elm.address.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "device.address must not be empty".to_string(),
                ));
            }
            if elm.timeout_ms == 0 {
                return Err(ConfigError::Invalid(
                    "device.timeout_ms must be greater than 0".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Frame transport selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Raw classic CAN over SocketCAN (Linux only)
    SocketCan(SocketCanConfig),
    /// In-process simulated ECU
    Mock(MockConfig),
    /// No bus; CAN-dependent features are disabled
    None,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

/// SocketCAN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketCanConfig {
    /// CAN interface name (e.g., "can0")
    #[serde(default = "default_interface")]
    pub interface: String,
}

impl Default for SocketCanConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
        }
    }
}

fn default_interface() -> String {
    "can0".to_string()
}

/// Mock transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated ECU response latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
    /// Answer diagnostic requests at all
    #[serde(default = "default_true")]
    pub respond: bool,
    /// Identifier the simulated ECU answers on
    #[serde(default = "default_response_id", with = "can_id")]
    pub response_id: u32,
    /// Stored trouble codes reported on mode 03 (at most three fit one frame)
    #[serde(default = "default_mock_dtcs")]
    pub dtcs: Vec<TroubleCode>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            respond: true,
            response_id: default_response_id(),
            dtcs: default_mock_dtcs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_mock_dtcs() -> Vec<TroubleCode> {
    ["P0087", "P0191", "P0401"]
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect()
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Scalar device selection (RPM, speed, coolant temperature)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeviceConfig {
    /// ELM327-compatible adapter reachable over TCP
    Elm327(Elm327Config),
    /// Mode 01 reads through the shared correlator
    Can,
    /// Random values in plausible ranges
    Simulated,
    /// No scalar readings
    None,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::Can
    }
}

/// ELM327 adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Elm327Config {
    /// Adapter address, e.g. "192.168.0.10:35000"
    #[serde(default = "default_elm_address")]
    pub address: String,
    /// Per-command timeout in milliseconds
    #[serde(default = "default_elm_timeout")]
    pub timeout_ms: u64,
}

impl Default for Elm327Config {
    fn default() -> Self {
        Self {
            address: default_elm_address(),
            timeout_ms: default_elm_timeout(),
        }
    }
}

impl Elm327Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_elm_address() -> String {
    "192.168.0.10:35000".to_string()
}

fn default_elm_timeout() -> u64 {
    1000
}

// =============================================================================
// Diagnostics / Telemetry
// =============================================================================

/// Addressing and timing of diagnostic exchanges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Identifier requests are sent to (functional broadcast address)
    #[serde(default = "default_request_id", with = "can_id")]
    pub request_id: u32,
    /// Identifier responses are expected from
    #[serde(default = "default_response_id", with = "can_id")]
    pub response_id: u32,
    /// Per-exchange response window in milliseconds
    #[serde(default = "default_exchange_timeout")]
    pub exchange_timeout_ms: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            request_id: default_request_id(),
            response_id: default_response_id(),
            exchange_timeout_ms: default_exchange_timeout(),
        }
    }
}

impl DiagnosticsConfig {
    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout_ms)
    }
}

fn default_request_id() -> u32 {
    OBD_FUNCTIONAL_ID
}

fn default_response_id() -> u32 {
    OBD_ECU_RESPONSE_ID
}

fn default_exchange_timeout() -> u64 {
    100
}

/// Cadence of the periodic tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Telemetry tick interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Identity and map refresh interval in seconds
    #[serde(default = "default_refresh_secs")]
    pub refresh_interval_secs: u64,
    /// Emit a test frame on the bus at this interval (disabled when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_frame_interval_secs: Option<u64>,
    /// Per-subscriber write window in milliseconds
    #[serde(default = "default_write_timeout")]
    pub subscriber_write_timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            refresh_interval_secs: default_refresh_secs(),
            test_frame_interval_secs: None,
            subscriber_write_timeout_ms: default_write_timeout(),
        }
    }
}

impl TelemetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn test_frame_interval(&self) -> Option<Duration> {
        self.test_frame_interval_secs.map(Duration::from_secs)
    }

    pub fn subscriber_write_timeout(&self) -> Duration {
        Duration::from_millis(self.subscriber_write_timeout_ms)
    }
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_refresh_secs() -> u64 {
    30
}

fn default_write_timeout() -> u64 {
    500
}

/// Parse a CAN ID from string (supports hex with 0x prefix)
pub fn parse_can_id(s: &str) -> Result<u32, ConfigError> {
    let trimmed = s.trim();
    let (digits, radix) = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => (hex, 16),
        None => (trimmed, 10),
    };

    let id = u32::from_str_radix(digits, radix)
        .map_err(|_| ConfigError::InvalidCanId(s.to_string()))?;
    if id > 0x1FFF_FFFF {
        return Err(ConfigError::InvalidCanId(s.to_string()));
    }
    Ok(id)
}

/// CAN IDs are written as `"0x7DF"` strings or plain integers
mod can_id {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u32),
        Str(String),
    }

    pub fn serialize<S: Serializer>(id: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{:03X}", id))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Int(id) if id <= 0x1FFF_FFFF => Ok(id),
            Raw::Int(id) => Err(serde::de::Error::custom(format!(
                "CAN ID 0x{:X} out of range",
                id
            ))),
            Raw::Str(s) => super::parse_can_id(&s).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert!(matches!(config.transport, TransportConfig::Mock(_)));
        assert!(matches!(config.device, DeviceConfig::Can));
        assert_eq!(config.diagnostics.request_id, 0x7DF);
        assert_eq!(config.diagnostics.response_id, 0x7E8);
        assert_eq!(config.diagnostics.exchange_timeout(), Duration::from_millis(100));
        assert_eq!(config.telemetry.interval(), Duration::from_secs(1));
        assert_eq!(config.telemetry.refresh_interval(), Duration::from_secs(30));
        assert!(config.telemetry.test_frame_interval().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_can_ids_accept_hex_strings_and_integers() {
        let config: EngineConfig = toml::from_str(
            r#"
            [diagnostics]
            request_id = "0x7E0"
            response_id = 2024
            "#,
        )
        .unwrap();
        assert_eq!(config.diagnostics.request_id, 0x7E0);
        assert_eq!(config.diagnostics.response_id, 0x7E8);

        let bad: Result<EngineConfig, _> = toml::from_str(
            r#"
            [diagnostics]
            request_id = "0xZZ"
            "#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_tagged_transport_and_device() {
        let config: EngineConfig = toml::from_str(
            r#"
            [transport]
            type = "socketcan"
            interface = "vcan0"

            [device]
            type = "elm327"
            address = "10.0.0.5:35000"
            "#,
        )
        .unwrap();

        match config.transport {
            TransportConfig::SocketCan(cfg) => assert_eq!(cfg.interface, "vcan0"),
            other => panic!("unexpected transport {:?}", other),
        }
        match config.device {
            DeviceConfig::Elm327(cfg) => {
                assert_eq!(cfg.address, "10.0.0.5:35000");
                assert_eq!(cfg.timeout_ms, 1000);
            }
            other => panic!("unexpected device {:?}", other),
        }

        let none: EngineConfig = toml::from_str("[transport]\ntype = \"none\"\n").unwrap();
        assert!(matches!(none.transport, TransportConfig::None));
    }

    #[test]
    fn test_mock_dtcs_parse_from_strings() {
        let config: EngineConfig = toml::from_str(
            r#"
            [transport]
            type = "mock"
            latency_ms = 5
            dtcs = ["P0234", "U0100"]
            "#,
        )
        .unwrap();

        let TransportConfig::Mock(mock) = config.transport else {
            panic!("expected mock transport");
        };
        assert_eq!(mock.latency_ms, 5);
        assert!(mock.respond);
        let codes: Vec<String> = mock.dtcs.iter().map(|c| c.to_string()).collect();
        assert_eq!(codes, vec!["P0234", "U0100"]);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = EngineConfig::default();
        config.telemetry.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.diagnostics.exchange_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.telemetry.test_frame_interval_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_can_id() {
        assert_eq!(parse_can_id("0x7DF").unwrap(), 0x7DF);
        assert_eq!(parse_can_id(" 2015 ").unwrap(), 2015);
        assert!(parse_can_id("0x20000000").is_err());
        assert!(parse_can_id("").is_err());
    }
}
