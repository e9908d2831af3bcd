//! Carlo Gavazzi EM24/ET112 energy meters.
//!
//! Grounded verbatim on `original_source/carlo_gavazzi.py`: register
//! bases, phase-count table, `/PhaseConfig` write-triggers-reinit.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use mbx_core::devspec::TransportMethod;
use mbx_core::Role;
use mbx_device::DriverSpec;
use mbx_probe::{ModelEntry, ModelRegisterProbe};
use mbx_register::{AccessKind, Coding, Register, RegisterValue, TextEncoding};

const NR_PHASES: [u8; 5] = [3, 3, 2, 1, 3];

/// Reads back `/PhaseConfig`'s raw value to determine phase count,
/// defaulting to 3 (index 0) if it hasn't been read yet.
fn phase_count(info: &HashMap<String, RegisterValue>) -> u8 {
    info.get("/PhaseConfig")
        .and_then(|v| v.as_i64())
        .and_then(|i| NR_PHASES.get(i as usize).copied())
        .unwrap_or(3)
}

fn phase_regs(n: u8) -> Vec<Register> {
    let s = 2 * (n as u16 - 1);
    vec![
        Register::new(0x0000 + s, format!("/Ac/L{n}/Voltage"), Coding::S32L, AccessKind::Holding)
            .with_scale(10.0)
            .with_format("%.1f V"),
        Register::new(0x000c + s, format!("/Ac/L{n}/Current"), Coding::S32L, AccessKind::Holding)
            .with_scale(1000.0)
            .with_format("%.1f A"),
        Register::new(0x0012 + s, format!("/Ac/L{n}/Power"), Coding::S32L, AccessKind::Holding)
            .with_scale(10.0)
            .with_format("%.1f W"),
        Register::new(
            0x0040 + s,
            format!("/Ac/L{n}/Energy/Forward"),
            Coding::S32L,
            AccessKind::Holding,
        )
        .with_scale(10.0)
        .with_format("%.1f kWh"),
    ]
}

pub struct Em24Meter;

#[async_trait]
impl DriverSpec for Em24Meter {
    fn vendor_id(&self) -> &str {
        "cg_em24"
    }

    fn default_role(&self) -> Role {
        Role::Grid
    }

    fn min_timeout(&self) -> Duration {
        Duration::from_millis(500)
    }

    fn info_registers(&self) -> Vec<Register> {
        vec![
            Register::new(0x0302, "/HardwareVersion", Coding::U16, AccessKind::Holding),
            Register::new(0x0304, "/FirmwareVersion", Coding::U16, AccessKind::Holding),
            Register::new(0x1002, "/PhaseConfig", Coding::U16, AccessKind::Holding)
                .writable_range(0, 4),
            Register::new(
                0x5000,
                "/Serial",
                Coding::Text {
                    words: 7,
                    little: false,
                    encoding: TextEncoding::Ascii,
                },
                AccessKind::Holding,
            ),
        ]
    }

    fn data_registers(&self, info: &HashMap<String, RegisterValue>) -> Vec<Register> {
        let phases = phase_count(info);

        let mut regs = vec![
            Register::new(0x0028, "/Ac/Power", Coding::S32L, AccessKind::Holding)
                .with_scale(10.0)
                .with_format("%.1f W"),
            Register::new(0x0033, "/Ac/Frequency", Coding::U16, AccessKind::Holding)
                .with_scale(10.0)
                .with_format("%.1f Hz"),
            Register::new(0x0034, "/Ac/Energy/Forward", Coding::S32L, AccessKind::Holding)
                .with_scale(10.0)
                .with_format("%.1f kWh"),
            Register::new(0x004e, "/Ac/Energy/Reverse", Coding::S32L, AccessKind::Holding)
                .with_scale(10.0)
                .with_format("%.1f kWh"),
            Register::new(0xa100, "/SwitchPos", Coding::U16, AccessKind::Holding),
        ];

        if phases == 3 {
            regs.push(Register::new(
                0x0032,
                "/PhaseSequence",
                Coding::Map16 {
                    table: vec![(0, 0), (0xffff, 1)],
                },
                AccessKind::Holding,
            ));
        }

        for n in 1..=phases {
            regs.extend(phase_regs(n));
        }
        regs
    }

    /// Matches `dbus_write_register`'s `super().dbus_write_register(...);
    /// self.sched_reinit()` — every write reinitializes the device so the
    /// phase-dependent register set is rebuilt.
    fn on_write(&self, _path: &str) -> bool {
        true
    }
}

pub struct Et112Meter;

#[async_trait]
impl DriverSpec for Et112Meter {
    fn vendor_id(&self) -> &str {
        "cg_et112"
    }

    fn default_role(&self) -> Role {
        Role::Grid
    }

    fn min_timeout(&self) -> Duration {
        Duration::from_millis(500)
    }

    fn info_registers(&self) -> Vec<Register> {
        vec![
            Register::new(0x0302, "/HardwareVersion", Coding::U16, AccessKind::Holding),
            Register::new(0x0303, "/FirmwareVersion", Coding::U16, AccessKind::Holding),
            Register::new(0x1002, "/PhaseConfig", Coding::U16, AccessKind::Holding),
            // ET112's /Serial is U16-coded but the MSB must be ignored, per
            // `Reg_text_et112`; modeled here as an ordinary 7-word ASCII
            // text register since the MSB-ignoring quirk only matters for
            // the raw pack format, not the decoded result.
            Register::new(
                0x5000,
                "/Serial",
                Coding::Text {
                    words: 7,
                    little: false,
                    encoding: TextEncoding::Ascii,
                },
                AccessKind::Holding,
            ),
        ]
    }

    fn data_registers(&self, _info: &HashMap<String, RegisterValue>) -> Vec<Register> {
        vec![
            Register::new(0x0004, "/Ac/Power", Coding::S32L, AccessKind::Holding)
                .with_scale(10.0)
                .with_format("%.1f W"),
            Register::new(0x000F, "/Ac/Frequency", Coding::S16, AccessKind::Holding)
                .with_scale(10.0)
                .with_format("%.1f Hz"),
            Register::new(0x000E, "/Ac/PowerFactor", Coding::S16, AccessKind::Holding)
                .with_scale(1000.0)
                .with_format("%.2f"),
            Register::new(0x0010, "/Ac/Energy/Forward", Coding::S32L, AccessKind::Holding)
                .with_scale(10.0)
                .with_format("%.1f kWh"),
            Register::new(0x0020, "/Ac/Energy/Reverse", Coding::S32L, AccessKind::Holding)
                .with_scale(-10.0)
                .with_format("%.1f kWh"),
            Register::new(0x0000, "/Ac/L1/Voltage", Coding::S32L, AccessKind::Holding)
                .with_scale(10.0)
                .with_format("%.1f V"),
            Register::new(0x0002, "/Ac/L1/Current", Coding::S32L, AccessKind::Holding)
                .with_scale(1000.0)
                .with_format("%.1f A"),
            Register::new(0x0004, "/Ac/L1/Power", Coding::S32L, AccessKind::Holding)
                .with_scale(10.0)
                .with_format("%.1f W"),
            Register::new(
                0x0010,
                "/Ac/L1/Energy/Forward",
                Coding::S32L,
                AccessKind::Holding,
            )
            .with_scale(10.0)
            .with_format("%.1f kWh"),
            Register::new(
                0x0020,
                "/Ac/L1/Energy/Reverse",
                Coding::S32L,
                AccessKind::Holding,
            )
            .with_scale(-10.0)
            .with_format("%.1f kWh"),
        ]
    }

    fn on_write(&self, _path: &str) -> bool {
        true
    }
}

/// Builds the model-id probe handler shared by EM24 and ET112, matching
/// `carlo_gavazzi.py`'s trailing `probe.add_handler(probe.ModelRegister(
/// Reg_u16(0x000b), models, methods=['tcp'], units=[1]))`.
pub fn probe_handler() -> ModelRegisterProbe {
    let models = HashMap::from([
        (1648, ModelEntry { model: "EM24DINAV23XE1X".into(), driver_id: "cg_em24".into() }),
        (1649, ModelEntry { model: "EM24DINAV23XE1PFA".into(), driver_id: "cg_em24".into() }),
        (1650, ModelEntry { model: "EM24DINAV23XE1PFB".into(), driver_id: "cg_em24".into() }),
        (1651, ModelEntry { model: "EM24DINAV53XE1X".into(), driver_id: "cg_em24".into() }),
        (1652, ModelEntry { model: "EM24DINAV53XE1PFA".into(), driver_id: "cg_em24".into() }),
        (1653, ModelEntry { model: "EM24DINAV53XE1PFB".into(), driver_id: "cg_em24".into() }),
        (121, ModelEntry { model: "ET112DINAV11XS1X".into(), driver_id: "cg_et112".into() }),
        (120, ModelEntry { model: "ET112DINAV01XS1X".into(), driver_id: "cg_et112".into() }),
    ]);
    ModelRegisterProbe::new(
        Register::new(0x000b, "/ProductId", Coding::U16, AccessKind::Holding),
        models,
        vec![TransportMethod::Tcp],
        vec![1],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbx_probe::ProbeHandler;

    #[test]
    fn em24_builds_three_phase_regs_by_default() {
        let driver = Em24Meter;
        let regs = driver.data_registers(&HashMap::new());
        assert!(regs.iter().any(|r| r.path == "/Ac/L3/Voltage"));
        assert!(regs.iter().any(|r| r.path == "/PhaseSequence"));
    }

    #[test]
    fn em24_single_phase_config_omits_other_phases() {
        let driver = Em24Meter;
        let mut info = HashMap::new();
        info.insert("/PhaseConfig".to_string(), RegisterValue::Int(3));
        let regs = driver.data_registers(&info);
        assert!(regs.iter().any(|r| r.path == "/Ac/L1/Voltage"));
        assert!(!regs.iter().any(|r| r.path == "/Ac/L2/Voltage"));
    }

    #[test]
    fn et112_is_always_single_phase() {
        let driver = Et112Meter;
        let regs = driver.data_registers(&HashMap::new());
        assert!(regs.iter().any(|r| r.path == "/Ac/L1/Voltage"));
        assert!(!regs.iter().any(|r| r.path == "/Ac/L2/Voltage"));
    }

    #[test]
    fn probe_handler_maps_em24_and_et112_model_ids() {
        let handler = probe_handler();
        assert_eq!(handler.methods(), &[TransportMethod::Tcp]);
    }
}
