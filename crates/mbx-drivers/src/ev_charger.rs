//! Victron AC22-family EV charging stations.
//!
//! Grounded on `original_source/ev_charger.py`'s `EV_Charger` base class
//! and its `AC22`/`AC22E`/`AC22NS`/`AC22_V2`/`AC22_V2_NS` subclasses —
//! distinguished only by product id and whether the model has a
//! physical display, modeled here as a `has_display` field rather than
//! five near-identical structs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use mbx_core::devspec::TransportMethod;
use mbx_core::Role;
use mbx_device::DriverSpec;
use mbx_probe::{ModelEntry, ModelRegisterProbe};
use mbx_register::{AccessKind, Coding, Register, RegisterValue, TextEncoding};

/// `/Mode` values, grounded on `EVC_MODE`.
pub mod mode {
    pub const MANUAL: i64 = 0;
    pub const AUTO: i64 = 1;
    pub const SCHEDULED: i64 = 2;
}

/// `/Status` values, grounded on `EVC_STATUS`.
pub mod status {
    pub const DISCONNECTED: i64 = 0;
    pub const CONNECTED: i64 = 1;
    pub const CHARGING: i64 = 2;
    pub const CHARGED: i64 = 3;
}

pub struct EvCharger {
    pub driver_id: &'static str,
    pub has_display: bool,
}

impl EvCharger {
    pub const AC22: Self = Self { driver_id: "evc_ac22", has_display: false };
    pub const AC22E: Self = Self { driver_id: "evc_ac22e", has_display: true };
    pub const AC22NS: Self = Self { driver_id: "evc_ac22ns", has_display: false };
    pub const AC22_V2: Self = Self { driver_id: "evc_ac22_v2", has_display: true };
    pub const AC22_V2_NS: Self = Self { driver_id: "evc_ac22_v2_ns", has_display: false };
}

#[async_trait]
impl DriverSpec for EvCharger {
    fn vendor_id(&self) -> &str {
        self.driver_id
    }

    fn default_role(&self) -> Role {
        Role::EvCharger
    }

    fn min_timeout(&self) -> Duration {
        Duration::from_millis(500)
    }

    fn info_registers(&self) -> Vec<Register> {
        vec![
            Register::new(
                5001,
                "/Serial",
                Coding::Text { words: 6, little: true, encoding: TextEncoding::Ascii },
                AccessKind::Holding,
            ),
            Register::new(5007, "/FirmwareVersion", Coding::U32B, AccessKind::Holding),
            Register::new(
                5027,
                "/CustomName",
                Coding::Text { words: 22, little: true, encoding: TextEncoding::Utf8 },
                AccessKind::Holding,
            ),
        ]
    }

    /// Firmware-gated register set, matching `device_init`'s early
    /// returns keyed on the `/FirmwareVersion` reading taken before
    /// `data_regs` is fully built.
    fn data_registers(&self, info: &HashMap<String, RegisterValue>) -> Vec<Register> {
        let fwver = info.get("/FirmwareVersion").and_then(|v| v.as_i64()).unwrap_or(0);

        let mut regs = vec![
            Register::new(5009, "/Mode", Coding::U16, AccessKind::Holding).writable(),
            Register::new(5010, "/StartStop", Coding::U16, AccessKind::Holding).writable(),
            Register::new(5011, "/Ac/L1/Power", Coding::U16, AccessKind::Holding).with_format("%d W"),
            Register::new(5012, "/Ac/L2/Power", Coding::U16, AccessKind::Holding).with_format("%d W"),
            Register::new(5013, "/Ac/L3/Power", Coding::U16, AccessKind::Holding).with_format("%d W"),
            Register::new(5014, "/Ac/Power", Coding::U16, AccessKind::Holding).with_format("%d W"),
            Register::new(5015, "/Status", Coding::U16, AccessKind::Holding),
            Register::new(5016, "/SetCurrent", Coding::U16, AccessKind::Holding)
                .with_format("%d A")
                .writable(),
            Register::new(5017, "/MaxCurrent", Coding::U16, AccessKind::Holding)
                .with_format("%d A")
                .writable(),
            Register::new(5018, "/Current", Coding::U16, AccessKind::Holding)
                .with_scale(10.0)
                .with_format("%.1f A"),
            Register::new(5019, "/ChargingTime", Coding::U32B, AccessKind::Holding)
                .with_format("%d s"),
            Register::new(5021, "/Ac/Energy/Forward", Coding::U16, AccessKind::Holding)
                .with_scale(100.0)
                .with_format("%.2f kWh"),
            Register::new(5026, "/Position", Coding::U16, AccessKind::Holding).writable(),
            Register::new(
                5027,
                "/CustomName",
                Coding::Text { words: 22, little: true, encoding: TextEncoding::Utf8 },
                AccessKind::Holding,
            )
            .writable(),
            Register::new(5049, "/AutoStart", Coding::U16, AccessKind::Holding)
                .writable_range(0, 1),
        ];

        // Before 1.21~1 the controller could only serve 50 registers.
        if fwver < 0x0001_2101 {
            return regs;
        }

        if self.has_display {
            regs.push(
                Register::new(5050, "/EnableDisplay", Coding::U16, AccessKind::Holding)
                    .writable_range(0, 1),
            );
        }

        if fwver < 0x0001_2202 {
            return regs;
        }

        regs.push(
            Register::new(5062, "/MinCurrent", Coding::U16, AccessKind::Holding)
                .with_format("%d A")
                .writable(),
        );
        regs
    }
}

/// mDNS service name registered for EV chargers, grounded on
/// `ev_charger.py`'s `mdns.add_service('_victron-car-charger._tcp')`.
pub const MDNS_SERVICE: &str = "_victron-car-charger._tcp.local.";

/// Model-id probe handler, grounded on `ev_charger.py`'s trailing
/// `probe.add_handler(probe.ModelRegister(Reg_u16(5000), models, ...))`.
pub fn probe_handler() -> ModelRegisterProbe {
    let models = HashMap::from([
        (0xc024, ModelEntry { model: "AC22".into(), driver_id: "evc_ac22".into() }),
        (0xc025, ModelEntry { model: "AC22E".into(), driver_id: "evc_ac22e".into() }),
        (0xc026, ModelEntry { model: "AC22NS".into(), driver_id: "evc_ac22ns".into() }),
        (0xc023, ModelEntry { model: "EVCS 32A V2".into(), driver_id: "evc_ac22_v2".into() }),
        (0xc027, ModelEntry { model: "EVCS 32A NS V2".into(), driver_id: "evc_ac22_v2_ns".into() }),
    ]);
    ModelRegisterProbe::new(
        Register::new(5000, "/ProductId", Coding::U16, AccessKind::Holding),
        models,
        vec![TransportMethod::Tcp],
        vec![1],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn old_firmware_omits_display_and_min_current_registers() {
        let driver = &EvCharger::AC22E;
        let mut info = HashMap::new();
        info.insert("/FirmwareVersion".to_string(), RegisterValue::Int(0));
        let regs = driver.data_registers(&info);
        assert!(!regs.iter().any(|r| r.path == "/EnableDisplay"));
        assert!(!regs.iter().any(|r| r.path == "/MinCurrent"));
    }

    #[test]
    fn display_model_gets_enable_display_register_once_firmware_allows() {
        let driver = &EvCharger::AC22E;
        let mut info = HashMap::new();
        info.insert("/FirmwareVersion".to_string(), RegisterValue::Int(0x0001_2101));
        let regs = driver.data_registers(&info);
        assert!(regs.iter().any(|r| r.path == "/EnableDisplay"));
        assert!(!regs.iter().any(|r| r.path == "/MinCurrent"));
    }

    #[test]
    fn non_display_model_never_gets_enable_display_register() {
        let driver = &EvCharger::AC22;
        let mut info = HashMap::new();
        info.insert("/FirmwareVersion".to_string(), RegisterValue::Int(0x0001_2202));
        let regs = driver.data_registers(&info);
        assert!(!regs.iter().any(|r| r.path == "/EnableDisplay"));
        assert!(regs.iter().any(|r| r.path == "/MinCurrent"));
    }
}
