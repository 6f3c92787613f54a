// Device registry endpoints
//
// Listing is two-phase: the device index, then each device's property map
// fetched concurrently. Either phase failing fails the whole listing so
// callers never see a half-populated snapshot.

use std::collections::BTreeMap;

use futures_util::future::try_join_all;
use secrecy::SecretString;
use serde_json::Value;
use tracing::debug;

use crate::cloud::client::CloudClient;
use crate::cloud::models::{
    DatapointAck, DatapointEntry, DatapointRequest, DatapointValue, DeviceEntry, DeviceListing,
    DeviceRecord, PropertyEntry, PropertyRecord,
};
use crate::error::Error;

impl CloudClient {
    /// List the account's devices without their properties.
    pub async fn list_device_records(
        &self,
        access_token: &SecretString,
    ) -> Result<Vec<DeviceRecord>, Error> {
        let url = self.device_url("devices.json")?;
        let entries: Vec<DeviceEntry> = self.get(url, access_token).await?;
        Ok(entries.into_iter().map(DeviceRecord::from).collect())
    }

    /// Fetch the full property list of one device.
    pub async fn get_properties(
        &self,
        access_token: &SecretString,
        serial: &str,
    ) -> Result<Vec<PropertyRecord>, Error> {
        let url = self.device_path(&["dsns", serial, "properties.json"])?;
        let entries: Vec<PropertyEntry> = self.get(url, access_token).await?;
        Ok(entries.into_iter().map(PropertyRecord::from).collect())
    }

    /// List devices together with their property maps.
    pub async fn list_devices(
        &self,
        access_token: &SecretString,
    ) -> Result<Vec<DeviceListing>, Error> {
        let records = self.list_device_records(access_token).await?;
        debug!(count = records.len(), "device index fetched");

        try_join_all(records.into_iter().map(|device| async move {
            let properties = self
                .get_properties(access_token, &device.dsn)
                .await?
                .into_iter()
                .map(|p| (p.name, p.value))
                .collect::<BTreeMap<String, Value>>();
            Ok::<_, Error>(DeviceListing { device, properties })
        }))
        .await
    }

    /// Write one property value. The ack is not a read-back: confirming the
    /// device applied it requires a later listing.
    pub async fn set_property(
        &self,
        access_token: &SecretString,
        serial: &str,
        property: &str,
        value: &Value,
    ) -> Result<DatapointAck, Error> {
        let url =
            self.device_path(&["dsns", serial, "properties", property, "datapoints.json"])?;
        let body = DatapointRequest {
            datapoint: DatapointValue { value },
        };
        let entry: DatapointEntry = self.post(url, access_token, &body).await?;
        debug!(property, "datapoint accepted");
        Ok(entry.into())
    }
}
