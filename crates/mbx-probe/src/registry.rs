//! [`ProbeRegistry`]: the set of known device handlers, queryable by
//! transport method. Grounded on `probe.py`'s module-level
//! `device_types` list and `add_handler`/`get_attrs`/`get_units`/
//! `get_rates` helpers — re-architected from module-level globals into
//! an owned registry per REDESIGN FLAGS.

use mbx_core::devspec::TransportMethod;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::ProbeHandler;

#[derive(Default)]
pub struct ProbeRegistry {
    handlers: Vec<Arc<dyn ProbeHandler>>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, handler: Arc<dyn ProbeHandler>) {
        self.handlers.push(handler);
    }

    pub fn handlers_for_method(&self, method: TransportMethod) -> Vec<Arc<dyn ProbeHandler>> {
        self.handlers
            .iter()
            .filter(|h| h.methods().contains(&method))
            .cloned()
            .collect()
    }

    /// Union of every handler-declared unit candidate for a given
    /// method, matching `probe.py`'s `get_units`.
    pub fn units_for_method(&self, method: TransportMethod) -> Vec<u8> {
        let mut set = BTreeSet::new();
        for h in self.handlers_for_method(method) {
            set.extend(h.units().iter().copied());
        }
        set.into_iter().collect()
    }

    /// Union of every handler-declared baud rate for a given method,
    /// matching `probe.py`'s `get_rates`; used by the serial scanner.
    pub fn rates_for_method(&self, method: TransportMethod) -> Vec<u32> {
        let mut set = BTreeSet::new();
        for h in self.handlers_for_method(method) {
            set.extend(h.rates().iter().copied());
        }
        set.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ModelEntry, ModelRegisterProbe};
    use mbx_register::{AccessKind, Coding, Register};
    use std::collections::HashMap;

    #[test]
    fn aggregates_units_across_handlers() {
        let mut registry = ProbeRegistry::new();
        let mut models = HashMap::new();
        models.insert(
            1,
            ModelEntry {
                model: "A".into(),
                driver_id: "a".into(),
            },
        );
        registry.add_handler(Arc::new(ModelRegisterProbe::new(
            Register::new(0, "/m", Coding::U16, AccessKind::Holding),
            models.clone(),
            vec![TransportMethod::Tcp],
            vec![1, 2],
        )));
        registry.add_handler(Arc::new(ModelRegisterProbe::new(
            Register::new(0, "/m", Coding::U16, AccessKind::Holding),
            models,
            vec![TransportMethod::Tcp],
            vec![2, 3],
        )));
        assert_eq!(registry.units_for_method(TransportMethod::Tcp), vec![1, 2, 3]);
        assert!(registry.units_for_method(TransportMethod::Rtu).is_empty());
    }
}
