//! The external settings surface: the persisted device list and
//! autoscan flag, plus change notification.
//!
//! Grounded on `dbus-modbus-client.py`'s `SettingsDevice` usage
//! (`self.settings['devices']`/`self.settings['autoscan']`,
//! `setting_changed` callback) — modeled as a small external trait,
//! the same way `mbx_core::bus::ObjectBus` stands in for the real
//! D-Bus binding (spec.md §1 Non-goal: concrete persistence is out of
//! scope). Ships an in-memory reference implementation for tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsSnapshot {
    pub devices: String,
    pub autoscan: bool,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            devices: String::new(),
            autoscan: false,
        }
    }
}

/// The settings collaborator the supervisor is written against.
/// Matches the two keys `dbus-modbus-client.py` registers under
/// `/Settings/ModbusClient/<name>/{Devices,AutoScan}`.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn snapshot(&self) -> SettingsSnapshot;

    /// Persists a new device list, matching `save_devices`'s
    /// `self.settings['devices'] = devstr`.
    async fn set_devices(&self, devices: String);

    /// Subscribes to snapshot changes, whether made locally via
    /// `set_devices` or by an external settings-store writer (e.g. a
    /// user editing the setting directly).
    fn subscribe(&self) -> broadcast::Receiver<SettingsSnapshot>;
}

pub struct InMemorySettingsStore {
    state: RwLock<SettingsSnapshot>,
    changes: broadcast::Sender<SettingsSnapshot>,
}

impl InMemorySettingsStore {
    pub fn new(initial: SettingsSnapshot) -> Self {
        let (changes, _rx) = broadcast::channel(16);
        Self {
            state: RwLock::new(initial),
            changes,
        }
    }

    pub fn set_autoscan(&self, autoscan: bool) {
        let mut guard = self.state.write();
        guard.autoscan = autoscan;
        let _ = self.changes.send(guard.clone());
    }
}

impl Default for InMemorySettingsStore {
    fn default() -> Self {
        Self::new(SettingsSnapshot::default())
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn snapshot(&self) -> SettingsSnapshot {
        self.state.read().clone()
    }

    async fn set_devices(&self, devices: String) {
        let mut guard = self.state.write();
        guard.devices = devices;
        let _ = self.changes.send(guard.clone());
    }

    fn subscribe(&self) -> broadcast::Receiver<SettingsSnapshot> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_devices_is_visible_in_next_snapshot() {
        let store = InMemorySettingsStore::default();
        store.set_devices("tcp:10.0.0.1:502:1".to_string()).await;
        assert_eq!(store.snapshot().await.devices, "tcp:10.0.0.1:502:1");
    }

    #[tokio::test]
    async fn subscribers_observe_device_list_changes() {
        let store = InMemorySettingsStore::default();
        let mut rx = store.subscribe();
        store.set_devices("udp:10.0.0.2:502:5".to_string()).await;
        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.devices, "udp:10.0.0.2:502:5");
    }
}
