//! [`ModelRegisterProbe`]: identifies a device by reading one register
//! and looking its decoded value up in a table of known models.
//!
//! Grounded on `probe.py`'s `ModelRegister` class: `reg`, `models`,
//! `timeout`, `methods`, `units`; `access` is derived from the register
//! itself or tried in both orders when unspecified (here, explicit
//! `access_candidates`, defaulting to holding-then-input).

use async_trait::async_trait;
use mbx_core::devspec::TransportMethod;
use mbx_core::DeviceSpec;
use mbx_register::{AccessKind, Register};
use mbx_transport::ClientHandle;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::ProbeError;
use crate::probe_fn::ProbeMatch;
use crate::ProbeHandler;

/// One row of a model table: the driver to instantiate and a
/// human-readable model name, keyed by the register's decoded raw
/// value. Grounded on `carlo_gavazzi.py`'s `models` dict
/// (`{1648: {'model': 'EM24 Ethernet', 'handler': EM24_Meter}, ...}`).
#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub model: String,
    pub driver_id: String,
}

pub struct ModelRegisterProbe {
    register: Register,
    models: HashMap<i64, ModelEntry>,
    timeout: Duration,
    methods: Vec<TransportMethod>,
    units: Vec<u8>,
    access_candidates: Vec<AccessKind>,
}

impl ModelRegisterProbe {
    pub fn new(
        register: Register,
        models: HashMap<i64, ModelEntry>,
        methods: Vec<TransportMethod>,
        units: Vec<u8>,
    ) -> Self {
        Self {
            register,
            models,
            timeout: Duration::from_secs(1),
            methods,
            units,
            access_candidates: vec![AccessKind::Holding, AccessKind::Input],
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_access(mut self, access: Vec<AccessKind>) -> Self {
        self.access_candidates = access;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl ProbeHandler for ModelRegisterProbe {
    fn methods(&self) -> &[TransportMethod] {
        &self.methods
    }

    fn units(&self) -> &[u8] {
        &self.units
    }

    async fn try_match(
        &self,
        _spec: &DeviceSpec,
        client: &ClientHandle,
    ) -> Result<Option<ProbeMatch>, ProbeError> {
        let count = self.register.word_count();
        for access in &self.access_candidates {
            let words = match access {
                AccessKind::Holding => {
                    client.read_holding_registers(self.register.base, count).await
                }
                AccessKind::Input => client.read_input_registers(self.register.base, count).await,
            };
            let words = match words {
                Ok(w) => w,
                Err(_) => continue,
            };
            let Ok(value) = self.register.decode(&words) else {
                continue;
            };
            let Some(raw) = value.as_i64() else {
                continue;
            };
            if let Some(entry) = self.models.get(&raw) {
                return Ok(Some(ProbeMatch {
                    model: entry.model.clone(),
                    driver_id: entry.driver_id.clone(),
                    access: *access,
                }));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbx_register::Coding;

    fn em24_models() -> HashMap<i64, ModelEntry> {
        let mut m = HashMap::new();
        m.insert(
            0x0670,
            ModelEntry {
                model: "EM24 Ethernet".to_string(),
                driver_id: "cg_em24".to_string(),
            },
        );
        m
    }

    #[test]
    fn em24_model_register_matches_scenario_a_address() {
        // Scenario A: probe register 0x000b, model code 0x0670 (EM24).
        let probe = ModelRegisterProbe::new(
            Register::new(0x000b, "/ModelCode", Coding::U16, AccessKind::Holding),
            em24_models(),
            vec![TransportMethod::Tcp],
            vec![1],
        );
        assert_eq!(probe.register.base, 0x000b);
        assert!(probe.methods().contains(&TransportMethod::Tcp));
        assert_eq!(probe.units(), &[1]);
    }
}
