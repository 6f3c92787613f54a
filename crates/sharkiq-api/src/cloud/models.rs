// Device-cloud wire types
//
// The device service wraps each record in a single-key object
// (`{"device": {...}}`, `{"property": {...}}`); some deployments return the
// bare record. Both shapes are accepted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /api/v1/token_sign_in` request body.
#[derive(Serialize)]
pub(crate) struct TokenSignInRequest<'a> {
    pub app_id: &'a str,
    pub app_secret: &'a str,
    pub token: &'a str,
}

/// `POST /api/v1/token_sign_in` success body.
#[derive(Deserialize)]
pub(crate) struct TokenSignInResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// One entry of `GET /apiv1/devices.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub dsn: String,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub oem_model: Option<String>,
    /// Self-reported status string, e.g. `"Online"` / `"Offline"`.
    #[serde(default)]
    pub connection_status: Option<String>,
    /// Last time the device contacted the cloud (RFC 3339).
    #[serde(default)]
    pub connected_at: Option<String>,
    #[serde(default)]
    pub lan_ip: Option<String>,
    /// Remaining fields, kept for diagnostics.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum DeviceEntry {
    Wrapped { device: DeviceRecord },
    Bare(DeviceRecord),
}

impl From<DeviceEntry> for DeviceRecord {
    fn from(entry: DeviceEntry) -> Self {
        match entry {
            DeviceEntry::Wrapped { device } | DeviceEntry::Bare(device) => device,
        }
    }
}

/// One entry of `GET /apiv1/dsns/{dsn}/properties.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub base_type: Option<String>,
    #[serde(default)]
    pub data_updated_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum PropertyEntry {
    Wrapped { property: PropertyRecord },
    Bare(PropertyRecord),
}

impl From<PropertyEntry> for PropertyRecord {
    fn from(entry: PropertyEntry) -> Self {
        match entry {
            PropertyEntry::Wrapped { property } | PropertyEntry::Bare(property) => property,
        }
    }
}

/// A device record together with its full property map.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceListing {
    pub device: DeviceRecord,
    pub properties: BTreeMap<String, Value>,
}

/// `POST .../datapoints.json` request body: `{"datapoint": {"value": ...}}`.
#[derive(Serialize)]
pub(crate) struct DatapointRequest<'a> {
    pub datapoint: DatapointValue<'a>,
}

#[derive(Serialize)]
pub(crate) struct DatapointValue<'a> {
    pub value: &'a Value,
}

/// Acknowledgement of a property write. Carries what the cloud recorded,
/// which is not a read-back of device state.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatapointAck {
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum DatapointEntry {
    Wrapped { datapoint: DatapointAck },
    Bare(DatapointAck),
}

impl From<DatapointEntry> for DatapointAck {
    fn from(entry: DatapointEntry) -> Self {
        match entry {
            DatapointEntry::Wrapped { datapoint } | DatapointEntry::Bare(datapoint) => datapoint,
        }
    }
}
