//! Diagnostic trouble code model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Largest numeric suffix a trouble code can carry (14 bits)
pub const MAX_TROUBLE_CODE: u16 = 0x3FFF;

/// DTC category, taken from the top two bits of the first encoded byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DtcCategory {
    /// P codes - Powertrain (engine, transmission)
    Powertrain,
    /// C codes - Chassis (ABS, suspension)
    Chassis,
    /// B codes - Body (airbags, climate control)
    Body,
    /// U codes - Network (communication)
    Network,
}

impl DtcCategory {
    /// Get category from the first DTC byte
    pub fn from_high_byte(high_byte: u8) -> Self {
        match (high_byte >> 6) & 0x03 {
            0 => DtcCategory::Powertrain,
            1 => DtcCategory::Chassis,
            2 => DtcCategory::Body,
            _ => DtcCategory::Network,
        }
    }

    /// Two-bit selector stored in the top of the first byte
    pub fn bits(&self) -> u8 {
        match self {
            DtcCategory::Powertrain => 0,
            DtcCategory::Chassis => 1,
            DtcCategory::Body => 2,
            DtcCategory::Network => 3,
        }
    }

    /// Get category prefix character
    pub fn prefix(&self) -> char {
        match self {
            DtcCategory::Powertrain => 'P',
            DtcCategory::Chassis => 'C',
            DtcCategory::Body => 'B',
            DtcCategory::Network => 'U',
        }
    }

    fn from_prefix(c: char) -> Option<Self> {
        match c {
            'P' => Some(DtcCategory::Powertrain),
            'C' => Some(DtcCategory::Chassis),
            'B' => Some(DtcCategory::Body),
            'U' => Some(DtcCategory::Network),
            _ => None,
        }
    }
}

/// A decoded trouble code, rendered as `{P|C|B|U}` plus four uppercase hex digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TroubleCode {
    category: DtcCategory,
    code: u16,
}

impl TroubleCode {
    /// Build a code; the suffix is masked to 14 bits
    pub fn new(category: DtcCategory, code: u16) -> Self {
        Self {
            category,
            code: code & MAX_TROUBLE_CODE,
        }
    }

    pub fn category(&self) -> DtcCategory {
        self.category
    }

    /// Numeric suffix (0..=0x3FFF)
    pub fn code(&self) -> u16 {
        self.code
    }
}

impl fmt::Display for TroubleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:04X}", self.category.prefix(), self.code)
    }
}

/// Error returned when a trouble-code string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid trouble code: {0}")]
pub struct ParseTroubleCodeError(pub String);

impl FromStr for TroubleCode {
    type Err = ParseTroubleCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTroubleCodeError(s.to_string());

        let mut chars = s.chars();
        let category = chars.next().and_then(DtcCategory::from_prefix).ok_or_else(err)?;
        let digits = chars.as_str();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err());
        }

        let code = u16::from_str_radix(digits, 16).map_err(|_| err())?;
        if code > MAX_TROUBLE_CODE {
            return Err(err());
        }

        Ok(Self::new(category, code))
    }
}

impl Serialize for TroubleCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TroubleCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_zero_pads() {
        let code = TroubleCode::new(DtcCategory::Powertrain, 0x0C);
        assert_eq!(code.to_string(), "P000C");
    }

    #[test]
    fn test_parse_round_trips_display() {
        let code: TroubleCode = "U0210".parse().unwrap();
        assert_eq!(code.category(), DtcCategory::Network);
        assert_eq!(code.code(), 0x0210);
        assert_eq!(code.to_string(), "U0210");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("X0123".parse::<TroubleCode>().is_err());
        assert!("P012".parse::<TroubleCode>().is_err());
        assert!("P01234".parse::<TroubleCode>().is_err());
        assert!("P01G3".parse::<TroubleCode>().is_err());
        // Suffix wider than 14 bits
        assert!("P4000".parse::<TroubleCode>().is_err());
    }

    #[test]
    fn test_serializes_as_string() {
        let code = TroubleCode::new(DtcCategory::Body, 0xFF);
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"B00FF\"");
    }
}
