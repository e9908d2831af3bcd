//! Device roles, mapped to the D-Bus-style service name fragment each
//! role occupies (`com.victronenergy.<role>.*` in the original system).
//! Grounded on the `default_role` class attribute used throughout the
//! vendor drivers (`carlo_gavazzi.py`, `ev_charger.py`, `dse.py`).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Grid,
    PvInverter,
    Genset,
    AcLoad,
    EvCharger,
    HeatPump,
    Tank,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Grid => "grid",
            Role::PvInverter => "pvinverter",
            Role::Genset => "genset",
            Role::AcLoad => "acload",
            Role::EvCharger => "evcharger",
            Role::HeatPump => "heatpump",
            Role::Tank => "tank",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_service_fragment() {
        assert_eq!(Role::EvCharger.to_string(), "evcharger");
        assert_eq!(Role::Tank.to_string(), "tank");
    }
}
