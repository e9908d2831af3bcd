//! mDNS discovery: a multicast listener for registered Victron-style
//! service names, feeding discovered `(host, port)` pairs to the
//! supervisor.
//!
//! Grounded on `mdns.py`'s `MDNS` class (service registration, PTR/SRV
//! correlation into a found-set protected by a lock, periodic query),
//! but built on the real `mdns-sd` crate's `ServiceDaemon::browse`
//! instead of hand-rolled DNS packet parsing — the PTR/SRV correlation
//! `parse_record` did by hand is exactly what `ServiceEvent::ServiceResolved`
//! already gives us.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use mdns_sd::{ServiceDaemon, ServiceEvent};
use tokio::sync::Mutex;

use crate::error::MdnsError;

pub type FoundService = (IpAddr, u16);

/// Listens for one or more registered mDNS service types and
/// accumulates resolved `(address, port)` pairs into a found-set that
/// the supervisor drains periodically (`MDNS_CHECK_INTERVAL`).
pub struct MdnsDiscoverer {
    daemon: ServiceDaemon,
    found: Arc<Mutex<HashSet<FoundService>>>,
}

impl MdnsDiscoverer {
    pub fn new() -> Result<Self, MdnsError> {
        Ok(Self {
            daemon: ServiceDaemon::new()?,
            found: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Starts browsing for `service_type` (e.g.
    /// `"_victron-energy-meter._udp.local."`), matching `mdns.py`'s
    /// `add_service`. Resolved services are pushed into the shared
    /// found-set by a background task for the lifetime of the browse.
    pub fn browse(&self, service_type: &str) -> Result<(), MdnsError> {
        let receiver = self.daemon.browse(service_type)?;
        let found = self.found.clone();
        tokio::spawn(async move {
            while let Ok(event) = receiver.recv_async().await {
                if let ServiceEvent::ServiceResolved(info) = event {
                    let port = info.get_port();
                    let mut guard = found.lock().await;
                    for addr in info.get_addresses() {
                        guard.insert((*addr, port));
                    }
                }
            }
        });
        Ok(())
    }

    /// Drains and clears the found-set, matching `mdns.py`'s
    /// `get_devices`.
    pub async fn drain(&self) -> HashSet<FoundService> {
        let mut guard = self.found.lock().await;
        std::mem::take(&mut *guard)
    }
}

impl Drop for MdnsDiscoverer {
    fn drop(&mut self) {
        let _ = self.daemon.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_starts_empty() {
        let Ok(discoverer) = MdnsDiscoverer::new() else {
            // No multicast-capable interface in this sandbox; nothing to
            // assert, but constructing it shouldn't panic elsewhere.
            return;
        };
        assert!(discoverer.drain().await.is_empty());
    }
}
