//! The object bus: the external publish/subscribe surface the bridge
//! writes decoded register values to and receives writes from.
//!
//! The real production bus (a D-Bus path tree, per spec.md §1) is out
//! of scope; this module defines the small interface the rest of the
//! crate actually consumes (`add_path`/`set_value`/`clear_path`/
//! `register_service`) plus an in-memory reference implementation used
//! by tests and by any deployment that hasn't wired in a real bus
//! binding. Shape grounded on `neomind-core::eventbus::EventBus`
//! (broadcast-channel-backed pub/sub), adapted to a path-keyed store.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A value as published on the bus. Kept untyped (string-rendered) at
/// this boundary since the concrete bus technology dictates wire
/// representation; `mbx-register::RegisterValue` carries the typed
/// form upstream of this interface.
#[derive(Debug, Clone, PartialEq)]
pub enum BusValue {
    Int(i64),
    Float(f64),
    Text(String),
    None,
}

impl std::fmt::Display for BusValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusValue::Int(v) => write!(f, "{v}"),
            BusValue::Float(v) => write!(f, "{v}"),
            BusValue::Text(v) => write!(f, "{v}"),
            BusValue::None => write!(f, "<none>"),
        }
    }
}

/// A change notification emitted on write-path update, consumed by
/// subscribers (device re-init triggers, external bridges).
#[derive(Debug, Clone)]
pub struct PathChange {
    pub service: String,
    pub path: String,
    pub value: BusValue,
}

/// The external collaborator interface the device framework and
/// supervisor are written against. Implementations publish decoded
/// register values under a hierarchical path namespace scoped by
/// service name (e.g. `com.victronenergy.grid.tcp_192_168_1_5`).
#[async_trait]
pub trait ObjectBus: Send + Sync {
    /// Registers a new service (one per device), returning nothing —
    /// idempotent if called again with the same name.
    async fn register_service(&self, service: &str);

    /// Adds or overwrites a path under a service with an initial value.
    async fn add_path(&self, service: &str, path: &str, value: BusValue);

    /// Updates the value at an already-added path.
    async fn set_value(&self, service: &str, path: &str, value: BusValue);

    /// Clears a path's value to "invalid" without removing it, matching
    /// `device.py`'s `read_data_regs` clearing behavior on decode
    /// failure.
    async fn clear_path(&self, service: &str, path: &str);

    /// Removes a service and all its paths entirely (device eviction).
    async fn remove_service(&self, service: &str);
}

/// In-memory `ObjectBus` reference implementation.
pub struct LocalBus {
    paths: DashMap<(String, String), BusValue>,
    changes: broadcast::Sender<PathChange>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBus {
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(1024);
        Self {
            paths: DashMap::new(),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PathChange> {
        self.changes.subscribe()
    }

    pub fn get(&self, service: &str, path: &str) -> Option<BusValue> {
        self.paths
            .get(&(service.to_string(), path.to_string()))
            .map(|v| v.clone())
    }
}

#[async_trait]
impl ObjectBus for LocalBus {
    async fn register_service(&self, service: &str) {
        tracing::debug!(service, "registering bus service");
    }

    async fn add_path(&self, service: &str, path: &str, value: BusValue) {
        self.paths
            .insert((service.to_string(), path.to_string()), value.clone());
        let _ = self.changes.send(PathChange {
            service: service.to_string(),
            path: path.to_string(),
            value,
        });
    }

    async fn set_value(&self, service: &str, path: &str, value: BusValue) {
        self.add_path(service, path, value).await;
    }

    async fn clear_path(&self, service: &str, path: &str) {
        self.add_path(service, path, BusValue::None).await;
    }

    async fn remove_service(&self, service: &str) {
        self.paths.retain(|(svc, _), _| svc != service);
    }
}

pub type SharedBus = Arc<dyn ObjectBus>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let bus = LocalBus::new();
        bus.add_path("svc", "/Ac/Power", BusValue::Int(42)).await;
        assert_eq!(bus.get("svc", "/Ac/Power"), Some(BusValue::Int(42)));
    }

    #[tokio::test]
    async fn clear_path_sets_none() {
        let bus = LocalBus::new();
        bus.add_path("svc", "/Ac/Power", BusValue::Int(42)).await;
        bus.clear_path("svc", "/Ac/Power").await;
        assert_eq!(bus.get("svc", "/Ac/Power"), Some(BusValue::None));
    }

    #[tokio::test]
    async fn remove_service_drops_all_its_paths() {
        let bus = LocalBus::new();
        bus.add_path("svc", "/A", BusValue::Int(1)).await;
        bus.add_path("svc", "/B", BusValue::Int(2)).await;
        bus.add_path("other", "/A", BusValue::Int(3)).await;
        bus.remove_service("svc").await;
        assert_eq!(bus.get("svc", "/A"), None);
        assert_eq!(bus.get("svc", "/B"), None);
        assert_eq!(bus.get("other", "/A"), Some(BusValue::Int(3)));
    }

    #[tokio::test]
    async fn subscribers_observe_changes() {
        let bus = LocalBus::new();
        let mut rx = bus.subscribe();
        bus.add_path("svc", "/A", BusValue::Int(7)).await;
        let change = rx.recv().await.unwrap();
        assert_eq!(change.service, "svc");
        assert_eq!(change.path, "/A");
        assert_eq!(change.value, BusValue::Int(7));
    }
}
