// ── Device cache snapshot ──
//
// One immutable view of the account's devices plus the set of serials
// confirmed online in the same cycle. Built whole, never patched.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::model::Device;

/// Devices from one successful listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceCache {
    devices: BTreeMap<String, Device>,
    online: BTreeSet<String>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl DeviceCache {
    /// Build the next snapshot from a fresh listing.
    ///
    /// A serial is confirmed online when the listing says so, or when its
    /// last-contact time moved forward since `previous`. The latter catches
    /// devices whose status string lags behind actual contact.
    ///
    /// Being present in the listing is not enough on its own: a device that
    /// reports "offline" with an unchanged contact time stays offline.
    pub fn from_listing(
        devices: Vec<Device>,
        previous: &DeviceCache,
        refreshed_at: DateTime<Utc>,
    ) -> Self {
        let online = devices
            .iter()
            .filter(|d| d.reports_online() || previous.contact_advanced(d))
            .map(|d| d.serial.clone())
            .collect();

        Self {
            devices: devices
                .into_iter()
                .map(|d| (d.serial.clone(), d))
                .collect(),
            online,
            refreshed_at: Some(refreshed_at),
        }
    }

    fn contact_advanced(&self, current: &Device) -> bool {
        let before = self
            .devices
            .get(&current.serial)
            .and_then(|d| d.last_seen);
        matches!((before, current.last_seen), (Some(b), Some(c)) if c > b)
    }

    /// Online check used by consumers.
    ///
    /// Confirmed-online membership wins over a self-reported "offline";
    /// otherwise the listing's own status decides. Unknown serials are
    /// offline.
    pub fn is_online(&self, serial: &str) -> bool {
        if self.online.contains(serial) {
            return true;
        }
        self.devices
            .get(serial)
            .is_some_and(|d| !d.reports_offline())
    }

    pub fn get(&self, serial: &str) -> Option<&Device> {
        self.devices.get(serial)
    }

    /// Devices ordered by serial.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn online(&self) -> &BTreeSet<String> {
        &self.online
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// When the listing behind this snapshot succeeded. `None` for the
    /// initial and invalidated snapshots.
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }
}
