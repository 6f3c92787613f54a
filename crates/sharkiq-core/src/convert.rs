// ── API-to-domain conversions ──
//
// Bridges raw `sharkiq_api` listing records into `Device`. Display names
// fall back to the serial; error codes come from the listing when present,
// else from the error-code property.

use chrono::{DateTime, Utc};
use serde_json::Value;

use sharkiq_api::DeviceListing;

use crate::model::{Device, ERROR_CODE_PROPERTY};

/// Parse an RFC 3339 timestamp, silently dropping unparseable values.
fn parse_datetime(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Render a property value as an error-code string. `0` and empty mean
/// "no error".
fn error_code_from(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) if n.as_i64() == Some(0) => None,
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if s.trim().is_empty() || s.trim() == "0" => None,
        Value::String(s) => Some(s.trim().to_owned()),
        _ => None,
    }
}

impl From<DeviceListing> for Device {
    fn from(listing: DeviceListing) -> Self {
        let DeviceListing { device, properties } = listing;

        let listed_error = device
            .extra
            .get("error_code")
            .and_then(error_code_from);
        let error_code =
            listed_error.or_else(|| properties.get(ERROR_CODE_PROPERTY).and_then(error_code_from));

        Device {
            name: device
                .product_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| device.dsn.clone()),
            serial: device.dsn,
            model: device.model,
            oem_model: device.oem_model,
            connection_status: device.connection_status,
            error_code,
            last_seen: parse_datetime(device.connected_at.as_deref()),
            properties,
        }
    }
}
