// ── Device domain type ──

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Property carrying the device's last error code.
pub const ERROR_CODE_PROPERTY: &str = "GET_Error_Code";

/// One appliance as of the latest successful listing.
///
/// Replaced wholesale every tick; never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Stable identifier (the device serial number / DSN).
    pub serial: String,
    pub name: String,
    pub model: Option<String>,
    pub oem_model: Option<String>,
    /// Status string exactly as the listing reported it.
    pub connection_status: Option<String>,
    pub error_code: Option<String>,
    pub properties: BTreeMap<String, Value>,
    /// Last time the device contacted the cloud.
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    /// Whether the listing's own status string says "offline".
    pub fn reports_offline(&self) -> bool {
        self.connection_status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("offline"))
    }

    /// Whether the listing's own status string says "online".
    pub fn reports_online(&self) -> bool {
        self.connection_status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("online"))
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// Mask a serial for log output: `AC***01`; serials shorter than four
/// characters are fully hidden.
pub fn mask_serial(serial: &str) -> String {
    let chars: Vec<char> = serial.chars().collect();
    if chars.len() < 4 {
        return "***".to_owned();
    }
    let head: String = chars.iter().take(2).collect();
    let tail: String = chars.iter().skip(chars.len() - 2).collect();
    format!("{head}***{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(status: Option<&str>) -> Device {
        Device {
            serial: "AC000W000000001".into(),
            name: "Kitchen".into(),
            model: None,
            oem_model: None,
            connection_status: status.map(str::to_owned),
            error_code: None,
            properties: BTreeMap::new(),
            last_seen: None,
        }
    }

    #[test]
    fn status_checks_are_case_insensitive() {
        assert!(device(Some("OFFLINE")).reports_offline());
        assert!(device(Some("Online")).reports_online());
        assert!(!device(Some("Online")).reports_offline());
        assert!(!device(None).reports_offline());
    }

    #[test]
    fn serials_are_masked() {
        assert_eq!(mask_serial("AC000W000000001"), "AC***01");
        assert_eq!(mask_serial("ABCD"), "AB***CD");
        assert_eq!(mask_serial("ABC"), "***");
    }
}
