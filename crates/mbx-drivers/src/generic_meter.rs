//! Config-driven generic Modbus meter: register layout supplied at
//! runtime by a JSON document instead of compiled into a driver.
//!
//! Grounded on `original_source/generic_modbus_meter.py`'s
//! `GenericMeterRTU`/`MatchWithConfig`, which load
//! `/data/etc/generic_rtu_meter.json` and build `Reg` instances via
//! `register.register_from_object`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use mbx_core::Role;
use mbx_device::DriverSpec;
use mbx_register::{AccessKind, Coding, Register, RegisterValue, TextEncoding};
use serde::Deserialize;

/// One row of a `GenericMeterConfig`'s `data_regs` array. Grounded on
/// the object shape `register.register_from_object` expects (base
/// address, human path, coding tag, optional scale/format/write).
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterSpec {
    pub base: u16,
    pub path: String,
    pub coding: String,
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub writable: bool,
    /// Only meaningful for `coding: "text"`.
    #[serde(default)]
    pub words: u16,
    #[serde(default)]
    pub little: bool,
}

fn default_scale() -> f64 {
    1.0
}

impl RegisterSpec {
    fn coding(&self) -> Coding {
        match self.coding.as_str() {
            "s16" => Coding::S16,
            "u16" => Coding::U16,
            "enum16" => Coding::Enum16,
            "s32b" => Coding::S32B,
            "u32b" => Coding::U32B,
            "s64b" => Coding::S64B,
            "u64b" => Coding::U64B,
            "s32l" => Coding::S32L,
            "u32l" => Coding::U32L,
            "s64l" => Coding::S64L,
            "u64l" => Coding::U64L,
            "f32b" => Coding::F32B,
            "f32l" => Coding::F32L,
            "text" => Coding::Text {
                words: self.words,
                little: self.little,
                encoding: TextEncoding::Ascii,
            },
            other => panic!("unknown generic meter register coding {other:?}"),
        }
    }

    fn access(&self) -> AccessKind {
        match self.access.as_deref() {
            Some("input") => AccessKind::Input,
            _ => AccessKind::Holding,
        }
    }

    fn to_register(&self) -> Register {
        let mut reg = Register::new(self.base, self.path.clone(), self.coding(), self.access())
            .with_scale(self.scale);
        if let Some(fmt) = &self.format {
            reg = reg.with_format(fmt.clone());
        }
        if self.writable {
            reg = reg.writable();
        }
        reg
    }
}

/// Probe match criterion plus the full register layout for one
/// config-driven meter model. Grounded on
/// `generic_modbus_meter.py`'s top-level config object (one entry of
/// the `generic_rtu_meter.json` array).
#[derive(Debug, Clone, Deserialize)]
pub struct GenericMeterConfig {
    #[serde(default)]
    pub product_id: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout: f64,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub version: String,
    pub model: String,
    pub data_regs: Vec<RegisterSpec>,
}

fn default_timeout_secs() -> f64 {
    1.0
}

impl GenericMeterConfig {
    pub fn from_json(text: &str) -> Result<Vec<Self>, serde_json::Error> {
        serde_json::from_str(text)
    }
}

pub struct GenericMeterDriver {
    config: GenericMeterConfig,
}

impl GenericMeterDriver {
    pub fn new(config: GenericMeterConfig) -> Self {
        Self { config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl DriverSpec for GenericMeterDriver {
    fn vendor_id(&self) -> &str {
        &self.config.model
    }

    fn default_role(&self) -> Role {
        Role::Grid
    }

    fn min_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.config.timeout)
    }

    fn info_registers(&self) -> Vec<Register> {
        Vec::new()
    }

    fn data_registers(&self, _info: &HashMap<String, RegisterValue>) -> Vec<Register> {
        self.config.data_regs.iter().map(RegisterSpec::to_register).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"[{
            "product_id": 1,
            "product_name": "Acme PM100",
            "model": "acme_pm100",
            "serial": "SN123",
            "data_regs": [
                {"base": 0, "path": "/Ac/Power", "coding": "s32b", "format": "%.0f W"},
                {"base": 2, "path": "/Ac/Voltage", "coding": "u16", "scale": 10.0}
            ]
        }]"#
    }

    #[test]
    fn parses_config_array_and_builds_registers() {
        let configs = GenericMeterConfig::from_json(sample_json()).unwrap();
        assert_eq!(configs.len(), 1);
        let driver = GenericMeterDriver::new(configs.into_iter().next().unwrap());
        let regs = driver.data_registers(&HashMap::new());
        assert_eq!(regs.len(), 2);
        assert_eq!(regs[0].path, "/Ac/Power");
        assert_eq!(regs[1].scale, 10.0);
    }

    #[test]
    fn missing_optional_fields_fall_back_to_defaults() {
        let configs = GenericMeterConfig::from_json(sample_json()).unwrap();
        let cfg = &configs[0];
        assert_eq!(cfg.timeout, 1.0);
        assert_eq!(cfg.product_id, 1);
    }
}
