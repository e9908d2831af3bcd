//! Sub-devices: auxiliary roles hosted under a parent device's service,
//! at a distinct sub-index (e.g. a genset's day tank alongside its
//! engine telemetry). Grounded on `dse.py`'s `DSE_Tank`, a
//! `device.SubDevice` sharing the parent's transport and service name.

use std::collections::{BTreeSet, HashMap};

use mbx_core::bus::{BusValue, SharedBus};
use mbx_core::devspec::TransportMethod;
use mbx_register::{AccessKind, Register, RegisterValue};
use mbx_transport::ClientHandle;

use crate::device::to_bus_value;
use crate::error::DeviceError;
use crate::packing::{pack_registers, RegisterGroup};

pub trait SubDevice: Send + Sync {
    /// The sub-device index this occupies under the parent service,
    /// matching `device.py`'s `SubDevice.subindex` / DBus
    /// `DeviceInstance` suffixing.
    fn sub_index(&self) -> u8;
}

/// Linear raw-value-to-level-fraction tank model. Grounded on
/// `dse.py`'s `DSE_Tank`: `raw_value_min`/`raw_value_max` bound the
/// register's raw reading, linearly mapped to `0.0..=1.0` of
/// `capacity`.
pub struct Tank {
    pub raw_value_min: f64,
    pub raw_value_max: f64,
    pub capacity: f64,
    sub_index: u8,
}

impl Tank {
    pub fn new(sub_index: u8, raw_value_min: f64, raw_value_max: f64, capacity: f64) -> Self {
        Self {
            raw_value_min,
            raw_value_max,
            capacity,
            sub_index,
        }
    }

    pub fn level_fraction(&self, raw: f64) -> f64 {
        let span = self.raw_value_max - self.raw_value_min;
        if span == 0.0 {
            return 0.0;
        }
        ((raw - self.raw_value_min) / span).clamp(0.0, 1.0)
    }

    pub fn remaining(&self, raw: f64) -> f64 {
        self.level_fraction(raw) * self.capacity
    }
}

impl SubDevice for Tank {
    fn sub_index(&self) -> u8 {
        self.sub_index
    }
}

/// A driver-authored template for a sub-device: its own info and data
/// registers, packed and polled independently of the parent's, plus an
/// optional [`Tank`] model layered over a `/RawValue` reading.
pub struct SubDeviceBlueprint {
    pub sub_index: u8,
    pub info_registers: Vec<Register>,
    pub data_registers: Vec<Register>,
    pub tank: Option<Tank>,
}

/// A live, polling sub-device. Shares the parent's [`ClientHandle`]
/// and bus service; its own paths are namespaced under
/// `/SubDevice/<subindex>` so they don't collide with the parent's.
/// Holds no [`crate::latency::LatencyFilter`] of its own — its reads
/// never feed the parent's latency-derived timeout, matching
/// `update()`'s "recurse without re-measuring latency".
pub struct SubDeviceState {
    sub_index: u8,
    info_registers: Vec<Register>,
    info: HashMap<String, RegisterValue>,
    data_regs: Vec<Register>,
    groups: Vec<RegisterGroup>,
    tank: Option<Tank>,
}

impl SubDeviceState {
    pub fn new(blueprint: SubDeviceBlueprint) -> Self {
        Self {
            sub_index: blueprint.sub_index,
            info_registers: blueprint.info_registers,
            info: HashMap::new(),
            data_regs: blueprint.data_registers,
            groups: Vec::new(),
            tank: blueprint.tank,
        }
    }

    fn path(&self, suffix: &str) -> String {
        format!("/SubDevice/{}{}", self.sub_index, suffix)
    }

    async fn read_words(
        &self,
        client: &ClientHandle,
        reg: &Register,
    ) -> Result<Vec<u16>, DeviceError> {
        let words = match reg.access {
            AccessKind::Holding => {
                client
                    .read_holding_registers(reg.base, reg.word_count())
                    .await?
            }
            AccessKind::Input => {
                client
                    .read_input_registers(reg.base, reg.word_count())
                    .await?
            }
        };
        Ok(words)
    }

    /// Reads this sub-device's own info registers, packs its data
    /// registers, inherits `/Serial`, `/FirmwareVersion`, and
    /// `/HardwareVersion` from the parent when it didn't read its own,
    /// and publishes every path.
    pub async fn init(
        &mut self,
        bus: &SharedBus,
        service: &str,
        method: TransportMethod,
        client: &ClientHandle,
        parent_info: &HashMap<String, RegisterValue>,
    ) -> Result<(), DeviceError> {
        self.info.clear();
        for reg in &self.info_registers {
            let words = self.read_words(client, reg).await?;
            let value = reg.decode(&words)?;
            self.info.insert(reg.path.clone(), value);
        }

        for inherited in ["/Serial", "/FirmwareVersion", "/HardwareVersion"] {
            if !self.info.contains_key(inherited) {
                if let Some(value) = parent_info.get(inherited) {
                    self.info.insert(inherited.to_string(), value.clone());
                }
            }
        }

        let barrier: BTreeSet<u16> = BTreeSet::new();
        self.groups = pack_registers(&self.data_regs, method, &barrier);

        for (path, value) in &self.info {
            bus.add_path(service, &self.path(path), to_bus_value(value))
                .await;
        }
        for reg in &self.data_regs {
            bus.add_path(service, &self.path(&reg.path), BusValue::None)
                .await;
        }
        if self.tank.is_some() {
            bus.add_path(service, &self.path("/Level"), BusValue::None)
                .await;
            bus.add_path(service, &self.path("/Remaining"), BusValue::None)
                .await;
        }
        Ok(())
    }

    /// Reads only this sub-device's own packed groups and publishes
    /// changes, deriving `/Level`/`/Remaining` from `/RawValue` when a
    /// [`Tank`] model is configured.
    pub async fn update(&mut self, bus: &SharedBus, service: &str, client: &ClientHandle) -> Result<(), DeviceError> {
        for group in &self.groups {
            let words = match group.access {
                AccessKind::Holding => {
                    client
                        .read_holding_registers(group.base, group.count)
                        .await?
                }
                AccessKind::Input => {
                    client
                        .read_input_registers(group.base, group.count)
                        .await?
                }
            };

            for &idx in &group.indices {
                let reg = &mut self.data_regs[idx];
                let offset = (reg.base - group.base) as usize;
                let span = &words[offset..offset + reg.word_count() as usize];
                match reg.decode(span) {
                    Ok(value) => {
                        if reg.update(value.clone()) {
                            bus.set_value(service, &self.path(&reg.path), to_bus_value(&value))
                                .await;
                        }
                    }
                    Err(_) => {
                        if reg.clear() {
                            bus.clear_path(service, &self.path(&reg.path)).await;
                        }
                    }
                }
            }
        }

        if let Some(tank) = &self.tank {
            let raw = self
                .data_regs
                .iter()
                .find(|r| r.path == "/RawValue")
                .and_then(|r| r.value())
                .and_then(|v| v.as_f64());
            if let Some(raw) = raw {
                bus.set_value(
                    service,
                    &self.path("/Level"),
                    BusValue::Float(tank.level_fraction(raw)),
                )
                .await;
                bus.set_value(
                    service,
                    &self.path("/Remaining"),
                    BusValue::Float(tank.remaining(raw)),
                )
                .await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_fraction_clamps_to_unit_range() {
        let tank = Tank::new(1, 0.0, 100.0, 200.0);
        assert_eq!(tank.level_fraction(-10.0), 0.0);
        assert_eq!(tank.level_fraction(50.0), 0.5);
        assert_eq!(tank.level_fraction(150.0), 1.0);
    }

    #[test]
    fn remaining_scales_by_capacity() {
        let tank = Tank::new(1, 0.0, 100.0, 200.0);
        assert_eq!(tank.remaining(25.0), 50.0);
    }

    #[test]
    fn degenerate_span_reports_empty_rather_than_dividing_by_zero() {
        let tank = Tank::new(1, 50.0, 50.0, 100.0);
        assert_eq!(tank.level_fraction(50.0), 0.0);
    }
}
