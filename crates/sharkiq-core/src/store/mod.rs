// ── Device store ──
//
// Lock-free snapshot storage. Readers load the current `Arc<DeviceCache>`
// without coordinating with the writer; every write swaps in a whole new
// snapshot and pushes it to `watch` subscribers.

mod cache;

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;

pub use cache::DeviceCache;

/// Holds the current device snapshot.
pub struct DeviceStore {
    current: ArcSwap<DeviceCache>,

    /// Version counter, bumped on every swap.
    version: watch::Sender<u64>,

    /// Latest snapshot for subscribers.
    snapshot: watch::Sender<Arc<DeviceCache>>,
}

impl DeviceStore {
    pub fn new() -> Self {
        let empty = Arc::new(DeviceCache::default());
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::clone(&empty));

        Self {
            current: ArcSwap::new(empty),
            version,
            snapshot,
        }
    }

    /// The current snapshot. Never blocks.
    pub fn snapshot(&self) -> Arc<DeviceCache> {
        self.current.load_full()
    }

    /// Subscribe to snapshot replacements.
    pub fn subscribe(&self) -> watch::Receiver<Arc<DeviceCache>> {
        self.snapshot.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Swap in `next` as a unit.
    pub(crate) fn replace(&self, next: DeviceCache) -> Arc<DeviceCache> {
        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        self.snapshot.send_replace(Arc::clone(&next));
        self.version.send_modify(|v| *v += 1);
        next
    }

    /// Drop everything the store knows.
    pub(crate) fn invalidate(&self) -> Arc<DeviceCache> {
        self.replace(DeviceCache::default())
    }
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::model::Device;

    fn device(serial: &str) -> Device {
        Device {
            serial: serial.into(),
            name: serial.into(),
            model: None,
            oem_model: None,
            connection_status: Some("Online".into()),
            error_code: None,
            properties: BTreeMap::new(),
            last_seen: None,
        }
    }

    #[test]
    fn replace_swaps_whole_snapshot_and_notifies() {
        let store = DeviceStore::new();
        let rx = store.subscribe();
        let before = store.snapshot();
        assert!(before.is_empty());

        let next = DeviceCache::from_listing(vec![device("A1B2")], &before, Utc::now());
        store.replace(next);

        assert_eq!(store.version(), 1);
        assert!(rx.has_changed().unwrap_or(false));
        assert!(store.snapshot().get("A1B2").is_some());
        // Readers holding the old snapshot keep a consistent view.
        assert!(before.is_empty());
    }

    #[test]
    fn invalidate_clears_everything() {
        let store = DeviceStore::new();
        let first = DeviceCache::from_listing(vec![device("A1B2")], &store.snapshot(), Utc::now());
        store.replace(first);
        store.invalidate();

        let snap = store.snapshot();
        assert!(snap.is_empty());
        assert!(snap.online().is_empty());
        assert!(snap.refreshed_at().is_none());
        assert_eq!(store.version(), 2);
    }
}
