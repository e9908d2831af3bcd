//! Vendor driver implementations and their probe handlers, plus the
//! catalog tying a probe match's `driver_id` back to a concrete
//! [`mbx_device::DriverSpec`] instance.
//!
//! Grounded on `original_source/probe.py`'s module-level registration
//! pattern: each vendor module calls `probe.add_handler(...)` at
//! import time, after which `device_types` can instantiate any handler
//! by the class it resolved to. Rust has no import-time side effects,
//! so [`build_registry`] performs the same registration explicitly.

pub mod carlo_gavazzi;
pub mod dse;
pub mod ev_charger;
pub mod generic_meter;

use std::collections::HashMap;
use std::sync::Arc;

use mbx_device::DriverSpec;
use mbx_probe::ProbeRegistry;

pub use carlo_gavazzi::{Em24Meter, Et112Meter};
pub use dse::DseGenerator;
pub use ev_charger::EvCharger;
pub use generic_meter::{GenericMeterConfig, GenericMeterDriver, RegisterSpec};

/// Maps a driver id (as returned in a [`mbx_probe::ProbeMatch`]) to the
/// `DriverSpec` instance the supervisor should drive the device with.
pub type DriverCatalog = HashMap<String, Arc<dyn DriverSpec>>;

/// Registers every built-in probe handler and returns the matching
/// driver catalog, so a caller only needs to look a `driver_id` up
/// once both pieces are built from the same source. Config-driven
/// generic meters are not included here — the supervisor adds one
/// catalog entry and one `MatchWithConfig`-equivalent probe handler
/// per parsed `GenericMeterConfig` at startup.
pub fn build_registry() -> (ProbeRegistry, DriverCatalog) {
    let mut registry = ProbeRegistry::new();
    let mut catalog: DriverCatalog = HashMap::new();

    registry.add_handler(Arc::new(carlo_gavazzi::probe_handler()));
    catalog.insert("cg_em24".to_string(), Arc::new(Em24Meter));
    catalog.insert("cg_et112".to_string(), Arc::new(Et112Meter));

    registry.add_handler(Arc::new(ev_charger::probe_handler()));
    catalog.insert("evc_ac22".to_string(), Arc::new(EvCharger::AC22));
    catalog.insert("evc_ac22e".to_string(), Arc::new(EvCharger::AC22E));
    catalog.insert("evc_ac22ns".to_string(), Arc::new(EvCharger::AC22NS));
    catalog.insert("evc_ac22_v2".to_string(), Arc::new(EvCharger::AC22_V2));
    catalog.insert("evc_ac22_v2_ns".to_string(), Arc::new(EvCharger::AC22_V2_NS));

    // DSE identifies itself by a manufacturer/model string, not a
    // single integer register value, so it has no `ModelRegisterProbe`
    // entry here; a DSE unit is matched by address/unit configuration
    // rather than auto-probing.
    catalog.insert("dse".to_string(), Arc::new(DseGenerator::new()));

    (registry, catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_registry_catalogs_every_built_in_driver_id() {
        let (_, catalog) = build_registry();
        assert!(catalog.contains_key("cg_em24"));
        assert!(catalog.contains_key("cg_et112"));
        assert!(catalog.contains_key("evc_ac22e"));
        assert!(catalog.contains_key("dse"));
    }
}
