//! [`Device`]: one live, initialized Modbus device bound to a transport
//! connection, a driver, and a bus service name.
//!
//! Grounded on `device.py`'s `ModbusDevice`: `init` reads the info
//! registers once and publishes the fixed paths, `update` reads the
//! packed data-register groups every tick and publishes changes,
//! `dbus_write_register` encodes and writes a single path, consulting
//! the driver for whether the write requires a reinit.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mbx_core::bus::{BusValue, SharedBus};
use mbx_core::{DeviceSpec, Role};
use mbx_register::{AccessKind, Register, RegisterValue};
use mbx_transport::ClientHandle;

use crate::driver::DriverSpec;
use crate::error::DeviceError;
use crate::latency::LatencyFilter;
use crate::lifecycle::DeviceState;
use crate::packing::{pack_registers, RegisterGroup};
use crate::subdevice::SubDeviceState;

const PROCESS_NAME: &str = "modbus-bridge";
const PROCESS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fast-changing power paths get a tighter `max_age` than everything
/// else, matching the rate the original polls `/Ac/*Power` at versus
/// its slower-changing energy and status registers.
const FAST_MAX_AGE: Duration = Duration::from_secs(1);
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(4);

fn is_fast_register_path(path: &str) -> bool {
    matches!(
        path,
        "/Ac/Power" | "/Ac/L1/Power" | "/Ac/L2/Power" | "/Ac/L3/Power"
    )
}

pub(crate) fn to_bus_value(v: &RegisterValue) -> BusValue {
    match v {
        RegisterValue::Int(i) => BusValue::Int(*i),
        RegisterValue::Float(f) => BusValue::Float(*f),
        RegisterValue::Text(s) => BusValue::Text(s.clone()),
        RegisterValue::Bits(b) => BusValue::Text(format!("{b:?}")),
    }
}

/// The user/settings-store-controlled binding for one device: which
/// role and VRM instance it should claim, whether it should be
/// instantiated at all, and its custom name and tank calibration.
/// Generalizes `settings.getVrmDeviceInstance`/`CustomName`/tank
/// calibration settings into a single value handed to `Device::init`.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub role: Option<Role>,
    pub instance: u32,
    pub enabled: bool,
    pub custom_name: Option<String>,
    pub tank_capacity: f64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            role: None,
            instance: 0,
            enabled: true,
            custom_name: None,
            tank_capacity: 0.0,
        }
    }
}

pub struct Device {
    pub spec: DeviceSpec,
    pub service: String,
    pub driver: Arc<dyn DriverSpec>,
    client: Option<ClientHandle>,
    model: String,
    role: Role,
    instance: u32,
    custom_name: Option<String>,
    info: HashMap<String, RegisterValue>,
    data_regs: Vec<Register>,
    groups: Vec<RegisterGroup>,
    children: Vec<SubDeviceState>,
    latency: LatencyFilter,
    timeout: Duration,
    state: DeviceState,
    last_success: Instant,
    last_settings: DeviceSettings,
    last_enable: bool,
}

impl Device {
    pub fn new(
        spec: DeviceSpec,
        service: String,
        driver: Arc<dyn DriverSpec>,
        client: ClientHandle,
        model: String,
    ) -> Self {
        let timeout = driver.min_timeout();
        let role = driver.default_role();
        Self {
            spec,
            service,
            driver,
            client: Some(client),
            model,
            role,
            instance: 0,
            custom_name: None,
            info: HashMap::new(),
            data_regs: Vec::new(),
            groups: Vec::new(),
            children: Vec::new(),
            latency: LatencyFilter::new(),
            timeout,
            state: DeviceState::Uninitialized,
            last_success: Instant::now(),
            last_settings: DeviceSettings::default(),
            last_enable: true,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn needs_reinit(&self) -> bool {
        matches!(self.state, DeviceState::ReinitPending)
    }

    pub fn sched_reinit(&mut self) {
        self.state = DeviceState::ReinitPending;
    }

    /// Runs the driver's auxiliary `device_init` hook, reads the info
    /// registers, binds `settings`, and — if enabled — packs and
    /// publishes the data-register set, the standard paths, and any
    /// sub-devices. If `enable` is false, releases the client and
    /// leaves the device `Disabled` without touching the bus at all.
    /// Matches `device.py`'s `init`, extended with the settings bind
    /// and enable gate the vendor drivers read from the settings store
    /// before calling `VeDbusService`.
    pub async fn init(
        &mut self,
        bus: &SharedBus,
        settings: &DeviceSettings,
        enable: bool,
    ) -> Result<(), DeviceError> {
        self.last_settings = settings.clone();
        self.last_enable = enable;

        self.info.clear();
        {
            let client = self.client.as_ref().ok_or(DeviceError::Disabled)?;
            self.driver.device_init(client, &mut self.info).await?;
        }
        for reg in self.driver.info_registers() {
            let words = self.read_words(&reg).await?;
            let value = reg.decode(&words)?;
            self.info.insert(reg.path.clone(), value);
        }

        self.role = settings.role.unwrap_or_else(|| self.driver.default_role());
        self.instance = settings.instance;
        self.custom_name = settings.custom_name.clone();

        if !enable {
            self.client = None;
            self.state = DeviceState::Disabled;
            return Ok(());
        }

        self.data_regs = self.driver.data_registers(&self.info);
        for reg in &mut self.data_regs {
            if reg.max_age.is_none() {
                reg.max_age = Some(if is_fast_register_path(&reg.path) {
                    FAST_MAX_AGE
                } else {
                    DEFAULT_MAX_AGE
                });
            }
        }
        let barrier: BTreeSet<u16> = self.driver.reg_barrier().into_iter().collect();
        self.groups = pack_registers(&self.data_regs, self.spec.method(), &barrier);

        bus.register_service(&self.service).await;

        for (path, value) in &self.info {
            bus.add_path(&self.service, path, to_bus_value(value)).await;
        }
        for reg in &self.data_regs {
            bus.add_path(&self.service, &reg.path, BusValue::None).await;
        }

        self.publish_standard_paths(bus).await;

        self.children = self
            .driver
            .sub_devices(settings)
            .into_iter()
            .map(SubDeviceState::new)
            .collect();
        if !self.children.is_empty() {
            let client = self.client.as_ref().ok_or(DeviceError::Disabled)?;
            for child in &mut self.children {
                child
                    .init(bus, &self.service, self.spec.method(), client, &self.info)
                    .await?;
            }
        }

        self.latency = LatencyFilter::new();
        self.timeout = self.driver.min_timeout();

        self.driver.device_init_late(bus, &self.service).await?;

        self.state = DeviceState::Initialized;
        self.last_success = Instant::now();
        Ok(())
    }

    /// Adds the mandatory standard paths every device publishes
    /// regardless of driver, matching `device.py`'s `init` block that
    /// adds `/Mgmt/*`, `/DeviceInstance`, `/ProductId`, `/ProductName`,
    /// `/Model`, and `/Connected` ahead of the driver-specific paths.
    async fn publish_standard_paths(&self, bus: &SharedBus) {
        bus.add_path(&self.service, "/Mgmt/ProcessName", BusValue::Text(PROCESS_NAME.into()))
            .await;
        bus.add_path(
            &self.service,
            "/Mgmt/ProcessVersion",
            BusValue::Text(PROCESS_VERSION.into()),
        )
        .await;
        bus.add_path(
            &self.service,
            "/Mgmt/Connection",
            BusValue::Text(self.spec.to_string()),
        )
        .await;
        bus.add_path(
            &self.service,
            "/DeviceInstance",
            BusValue::Int(self.instance as i64),
        )
        .await;
        bus.add_path(
            &self.service,
            "/ProductId",
            BusValue::Text(self.driver.vendor_id().to_string()),
        )
        .await;
        bus.add_path(&self.service, "/ProductName", BusValue::Text(self.model.clone()))
            .await;
        bus.add_path(&self.service, "/Model", BusValue::Text(self.model.clone()))
            .await;
        bus.add_path(&self.service, "/Connected", BusValue::Int(1)).await;
        bus.add_path(&self.service, "/Role", BusValue::Text(self.role.to_string()))
            .await;

        let allowed = self.driver.allowed_roles();
        if !allowed.is_empty() {
            let joined = allowed
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(",");
            bus.add_path(&self.service, "/AllowedRoles", BusValue::Text(joined))
                .await;
        }

        if let Some(name) = &self.custom_name {
            bus.add_path(&self.service, "/CustomName", BusValue::Text(name.clone()))
                .await;
        }
    }

    /// Reads every packed register group whose members are due for
    /// another read, decodes each register within it, and publishes
    /// changed values to the bus. A decode failure on one register
    /// clears just that path rather than failing the whole tick,
    /// matching `device.py`'s `read_data_regs`. A `ReinitPending`
    /// device is torn down and re-`init`ialized instead of erroring,
    /// matching "if need_reinit: destroy and re-init; clear the flag."
    /// A `Disabled` device is a no-op.
    pub async fn update(&mut self, bus: &SharedBus) -> Result<(), DeviceError> {
        if self.state == DeviceState::ReinitPending {
            let settings = self.last_settings.clone();
            let enable = self.last_enable;
            return self.init(bus, &settings, enable).await;
        }

        if self.state == DeviceState::Disabled {
            return Ok(());
        }

        if self.state != DeviceState::Initialized {
            return Err(DeviceError::ReinitRequired);
        }

        let now = Instant::now();
        let started = now;
        {
            let client = self.client.as_ref().ok_or(DeviceError::Disabled)?;
            for group in &self.groups {
                let due = group
                    .indices
                    .iter()
                    .any(|&idx| self.data_regs[idx].is_due(now));
                if !due {
                    continue;
                }

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

                let read_at = Instant::now();
                for &idx in &group.indices {
                    let reg = &mut self.data_regs[idx];
                    let offset = (reg.base - group.base) as usize;
                    let span = &words[offset..offset + reg.word_count() as usize];
                    reg.mark_read(read_at);
                    match reg.decode(span) {
                        Ok(value) => {
                            if reg.update(value.clone()) {
                                bus.set_value(&self.service, &reg.path, to_bus_value(&value))
                                    .await;
                            }
                        }
                        Err(_) => {
                            if reg.clear() {
                                bus.clear_path(&self.service, &reg.path).await;
                            }
                        }
                    }
                }
            }
        }

        self.latency.update(started.elapsed());
        self.timeout = self.latency.timeout(self.driver.min_timeout());
        self.last_success = Instant::now();

        // Sub-devices recurse without feeding their read latency back
        // into the parent's timeout-derived latency filter.
        {
            let client = self.client.as_ref().ok_or(DeviceError::Disabled)?;
            for child in &mut self.children {
                child.update(bus, &self.service, client).await?;
            }
        }

        Ok(())
    }

    /// Encodes and writes a single value at `path`, consulting the
    /// driver for whether this write requires a reinit before the next
    /// update.
    pub async fn write(&mut self, path: &str, value: RegisterValue) -> Result<(), DeviceError> {
        let reg = self
            .data_regs
            .iter()
            .find(|r| r.path == path)
            .ok_or_else(|| DeviceError::NotFound(path.to_string()))?;

        let words = reg.encode(&value)?;
        let client = self.client.as_ref().ok_or(DeviceError::Disabled)?;
        if words.len() == 1 {
            client.write_single_register(reg.base, words[0]).await?;
        } else {
            client.write_multiple_registers(reg.base, &words).await?;
        }

        if self.driver.on_write(path) {
            self.sched_reinit();
        }
        Ok(())
    }

    pub fn last_success(&self) -> Instant {
        self.last_success
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn read_words(&self, reg: &Register) -> Result<Vec<u16>, DeviceError> {
        let client = self.client.as_ref().ok_or(DeviceError::Disabled)?;
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_bus_value_maps_each_register_value_variant() {
        assert_eq!(to_bus_value(&RegisterValue::Int(5)), BusValue::Int(5));
        assert_eq!(to_bus_value(&RegisterValue::Float(1.5)), BusValue::Float(1.5));
        assert_eq!(
            to_bus_value(&RegisterValue::Text("abc".into())),
            BusValue::Text("abc".into())
        );
        assert!(matches!(
            to_bus_value(&RegisterValue::Bits(vec![1, 2])),
            BusValue::Text(_)
        ));
    }

    #[test]
    fn fast_register_paths_are_the_per_phase_and_total_ac_power() {
        assert!(is_fast_register_path("/Ac/Power"));
        assert!(is_fast_register_path("/Ac/L2/Power"));
        assert!(!is_fast_register_path("/Ac/Energy/Forward"));
    }

    #[test]
    fn device_settings_default_is_enabled_with_no_instance() {
        let settings = DeviceSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.instance, 0);
        assert!(settings.role.is_none());
    }
}
