// Second hop: device-cloud token exchange and device registry.

pub mod client;
mod devices;
mod exchange;
pub mod models;

pub use client::{AppCredentials, CloudClient};
pub use models::{DatapointAck, DeviceListing, DeviceRecord, PropertyRecord};
