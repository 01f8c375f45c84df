//! ECU identity model

use serde::{Deserialize, Serialize};

/// Identity strings reported by the engine ECU.
///
/// Every field is independently optional: a sub-query that times out leaves
/// its field unset rather than empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcuInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "calibration", skip_serializing_if = "Option::is_none")]
    pub calibration_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl EcuInfo {
    /// Number of fields that carry a value
    pub fn populated_fields(&self) -> usize {
        [
            &self.vin,
            &self.version,
            &self.calibration_id,
            &self.hardware,
            &self.software,
            &self.protocol,
        ]
        .iter()
        .filter(|f| f.is_some())
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unset_fields_are_omitted() {
        let info = EcuInfo {
            vin: Some("KMJWA7".to_string()),
            calibration_id: Some("CAL123".to_string()),
            ..Default::default()
        };

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "vin": "KMJWA7", "calibration": "CAL123" })
        );
        assert_eq!(info.populated_fields(), 2);
    }
}
