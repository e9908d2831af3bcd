//! Deep Sea Electronics genset controllers (GenComm register map).
//!
//! Grounded on `original_source/dse.py`'s `DSE_Generator`/`DSE_Tank`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use mbx_core::Role;
use mbx_device::{DeviceSettings, DriverSpec, HasErrorId, SubDeviceBlueprint, Tank};
use mbx_register::{AccessKind, Coding, Register, RegisterValue};

/// GenComm register-width invalid sentinels, masked per coding width.
/// Grounded verbatim on `dse.py`'s `INVALID` list and `Reg_DSE_num`'s
/// `x & self.invalid_mask`.
const INVALID_RAW: [i64; 8] = [-1, -2, -3, -4, -5, -6, -7, -8];

fn invalid_for(mask: i64) -> Vec<i64> {
    INVALID_RAW.iter().map(|x| x & mask).collect()
}

/// GenComm System Control Function keys, grounded on
/// `DSE_Generator.SCF_SELECT_AUTO_MODE`/`SCF_TELEMETRY_START`/
/// `SCF_TELEMETRY_STOP`.
pub mod scf {
    pub const SELECT_AUTO_MODE: u16 = 35701;
    pub const TELEMETRY_START: u16 = 35732;
    pub const TELEMETRY_STOP: u16 = 35733;
}

pub struct DseGenerator {
    /// `has_remote_start` class attribute, `None` means detect via the
    /// GenComm system-control-function availability registers at
    /// runtime instead of assuming support.
    pub remote_start: Option<bool>,
}

impl DseGenerator {
    pub fn new() -> Self {
        Self { remote_start: None }
    }
}

impl Default for DseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DriverSpec for DseGenerator {
    fn vendor_id(&self) -> &str {
        "dse"
    }

    fn default_role(&self) -> Role {
        Role::Genset
    }

    fn min_timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn info_registers(&self) -> Vec<Register> {
        vec![Register::new(770, "/Serial", Coding::U32B, AccessKind::Holding)]
    }

    fn data_registers(&self, _info: &HashMap<String, RegisterValue>) -> Vec<Register> {
        vec![
            Register::new(1536, "/Ac/Power", Coding::S32B, AccessKind::Holding)
                .with_invalid(invalid_for(0x7fffffff))
                .with_format("%.0f W"),
            Register::new(1052, "/Ac/L1/Power", Coding::S32B, AccessKind::Holding)
                .with_invalid(invalid_for(0x7fffffff))
                .with_format("%.0f W"),
            Register::new(1054, "/Ac/L2/Power", Coding::S32B, AccessKind::Holding)
                .with_invalid(invalid_for(0x7fffffff))
                .with_format("%.0f W"),
            Register::new(1056, "/Ac/L3/Power", Coding::S32B, AccessKind::Holding)
                .with_invalid(invalid_for(0x7fffffff))
                .with_format("%.0f W"),
            Register::new(1032, "/Ac/L1/Voltage", Coding::U32B, AccessKind::Holding)
                .with_invalid(invalid_for(0xffffffff))
                .with_scale(10.0)
                .with_format("%.0f V"),
            Register::new(1034, "/Ac/L2/Voltage", Coding::U32B, AccessKind::Holding)
                .with_invalid(invalid_for(0xffffffff))
                .with_scale(10.0)
                .with_format("%.0f V"),
            Register::new(1036, "/Ac/L3/Voltage", Coding::U32B, AccessKind::Holding)
                .with_invalid(invalid_for(0xffffffff))
                .with_scale(10.0)
                .with_format("%.0f V"),
            Register::new(1044, "/Ac/L1/Current", Coding::U32B, AccessKind::Holding)
                .with_invalid(invalid_for(0xffffffff))
                .with_scale(10.0)
                .with_format("%.0f A"),
            Register::new(1046, "/Ac/L2/Current", Coding::U32B, AccessKind::Holding)
                .with_invalid(invalid_for(0xffffffff))
                .with_scale(10.0)
                .with_format("%.0f A"),
            Register::new(1048, "/Ac/L3/Current", Coding::U32B, AccessKind::Holding)
                .with_invalid(invalid_for(0xffffffff))
                .with_scale(10.0)
                .with_format("%.0f A"),
            Register::new(1800, "/Ac/Energy/Forward", Coding::U32B, AccessKind::Holding)
                .with_invalid(invalid_for(0xffffffff))
                .with_scale(10.0)
                .with_format("%.0f kWh"),
            Register::new(1031, "/Ac/Frequency", Coding::U16, AccessKind::Holding)
                .with_invalid(invalid_for(0xffff))
                .with_scale(10.0)
                .with_format("%.1f Hz"),
            Register::new(1030, "/Engine/Speed", Coding::U16, AccessKind::Holding)
                .with_invalid(invalid_for(0xffff))
                .with_format("%.0f RPM"),
            Register::new(1025, "/Engine/CoolantTemperature", Coding::S16, AccessKind::Holding)
                .with_invalid(invalid_for(0x7fff))
                .with_format("%.1f C"),
            Register::new(1024, "/Engine/OilPressure", Coding::U16, AccessKind::Holding)
                .with_invalid(invalid_for(0xffff))
                .with_format("%.0f kPa"),
            Register::new(1026, "/Engine/OilTemperature", Coding::S16, AccessKind::Holding)
                .with_invalid(invalid_for(0x7fff))
                .with_format("%.0f C"),
            Register::new(1558, "/Engine/Load", Coding::S16, AccessKind::Holding)
                .with_invalid(invalid_for(0x7fff))
                .with_scale(10.0)
                .with_format("%.0f %%"),
            Register::new(1798, "/Engine/OperatingHours", Coding::U32B, AccessKind::Holding)
                .with_invalid(invalid_for(0xffffffff))
                .with_format("%.1f s"),
            Register::new(1808, "/Engine/Starts", Coding::U32B, AccessKind::Holding)
                .with_invalid(invalid_for(0xffffffff))
                .with_format("%.0f"),
            Register::new(1029, "/StarterVoltage", Coding::U16, AccessKind::Holding)
                .with_invalid(invalid_for(0xffff))
                .with_scale(10.0)
                .with_format("%.1f V"),
            Register::new(
                772,
                "/RemoteStartModeEnabled",
                Coding::Map16 {
                    table: vec![
                        (0, 0),
                        (1, 1),
                        (2, 0),
                        (3, 0),
                        (4, 1),
                        (5, 0),
                        (6, 0),
                        (7, 0),
                    ],
                },
                AccessKind::Holding,
            ),
            Register::new(
                1408,
                "/StatusCode",
                Coding::Map16 {
                    table: vec![
                        (0, 0),
                        (1, 2),
                        (2, 8),
                        (3, 8),
                        (4, 9),
                        (5, 0),
                        (6, 0),
                        (15, 10),
                    ],
                },
                AccessKind::Holding,
            ),
        ]
    }

    fn remote_start_override(&self) -> Option<bool> {
        self.remote_start
    }

    /// The day tank, matching `DSE_Generator`'s `DSE_Tank(self, 0)`
    /// sub-device: a single `/RawValue` percent register at 1027,
    /// calibrated against the settings-store tank capacity.
    fn sub_devices(&self, settings: &DeviceSettings) -> Vec<SubDeviceBlueprint> {
        vec![SubDeviceBlueprint {
            sub_index: 0,
            info_registers: Vec::new(),
            data_registers: vec![Register::new(1027, "/RawValue", Coding::U16, AccessKind::Holding)
                .with_format("%.0f %%")],
            tank: Some(day_tank(settings.tank_capacity)),
        }]
    }
}

impl HasErrorId for DseGenerator {
    /// Matches `DSE_Generator.alarm_level`: warning (2), shutdown (3),
    /// and electrical-trip (4) alarms.
    fn describe_error(&self, code: i64) -> Option<&'static str> {
        match code {
            2 => Some("warning alarm"),
            3 => Some("shutdown alarm"),
            4 => Some("electrical trip alarm"),
            _ => None,
        }
    }
}

/// Builds the day-tank sub-device at register 1027, matching
/// `DSE_Tank`'s `raw_value_min`/`raw_value_max` (0..100, percent).
pub fn day_tank(capacity: f64) -> Tank {
    Tank::new(0, 0.0, 100.0, capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_sentinels_are_masked_to_register_width() {
        let masked = invalid_for(0xffff);
        assert_eq!(masked[0], 0xffff);
        let masked32 = invalid_for(0x7fffffff);
        assert_eq!(masked32[0], 0x7fffffff);
    }

    #[test]
    fn status_code_maps_running_states_to_running() {
        let driver = DseGenerator::new();
        let regs = driver.data_registers(&HashMap::new());
        let status = regs.iter().find(|r| r.path == "/StatusCode").unwrap();
        let Coding::Map16 { table } = &status.coding else {
            panic!("expected Map16 coding");
        };
        assert!(table.contains(&(2, 8)));
        assert!(table.contains(&(3, 8)));
    }

    #[test]
    fn describe_error_covers_all_three_alarm_levels() {
        let driver = DseGenerator::new();
        assert_eq!(driver.describe_error(2), Some("warning alarm"));
        assert_eq!(driver.describe_error(3), Some("shutdown alarm"));
        assert_eq!(driver.describe_error(4), Some("electrical trip alarm"));
        assert_eq!(driver.describe_error(1), None);
    }

    #[test]
    fn day_tank_uses_dse_tank_bounds() {
        let tank = day_tank(150.0);
        assert_eq!(tank.level_fraction(50.0), 0.5);
        assert_eq!(tank.remaining(50.0), 75.0);
    }

    #[test]
    fn remote_start_override_defaults_to_runtime_detection() {
        let driver = DseGenerator::new();
        assert_eq!(driver.remote_start_override(), None);
    }
}
