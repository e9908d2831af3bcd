//! [`DriverSpec`]: the per-vendor-model contract a driver implements.
//!
//! Replaces `register.py`/vendor-module class attributes
//! (`vendor_id`, `productid`, `min_timeout`, `info_regs`/`data_regs`)
//! with a single trait object, letting the device framework stay
//! generic over which model it's driving.

use async_trait::async_trait;
use mbx_core::bus::SharedBus;
use mbx_core::Role;
use mbx_register::{Register, RegisterValue};
use mbx_transport::ClientHandle;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::DeviceError;
use crate::subdevice::SubDeviceBlueprint;
use crate::device::DeviceSettings;

#[async_trait]
pub trait DriverSpec: Send + Sync {
    /// Stable identifier used in service names and probe match results
    /// (e.g. `"cg_em24"`, `"dse"`).
    fn vendor_id(&self) -> &str;

    fn default_role(&self) -> Role;

    /// Other roles this device could be assigned instead of
    /// `default_role`, published as `/AllowedRoles` when non-empty.
    /// Default is empty: most drivers have a single fixed role.
    fn allowed_roles(&self) -> Vec<Role> {
        Vec::new()
    }

    /// Floor under the latency-derived timeout. Grounded on the
    /// `timeout` class attribute several `register.py` drivers
    /// override upward for slow instruments.
    fn min_timeout(&self) -> Duration {
        Duration::from_millis(300)
    }

    /// Registers read once at init time to determine the device's
    /// identity and fixed configuration (serial number, firmware
    /// version, phase configuration).
    fn info_registers(&self) -> Vec<Register>;

    /// Registers polled every update tick, built from what was learned
    /// from `info_registers` (e.g. a phase count determines which
    /// per-phase registers exist). Grounded on `device.py`'s
    /// `ModbusDevice.data_regs` being assembled after `read_info_regs`.
    fn data_registers(&self, info: &HashMap<String, RegisterValue>) -> Vec<Register>;

    /// Registers whose read must not be silently coalesced across a
    /// gap with a neighboring register group (reading them has a
    /// device-side side effect, e.g. clear-on-read counters).
    fn reg_barrier(&self) -> Vec<u16> {
        Vec::new()
    }

    /// Called after a successful write to `path`; returns whether the
    /// device needs to be reinitialized before its next update.
    /// Grounded on the vendor drivers' `dbus_write_register` handlers
    /// that call `self.sched_reinit()` after certain writes (e.g.
    /// `/PhaseConfig`).
    fn on_write(&self, _path: &str) -> bool {
        false
    }

    /// Hook for drivers exposing a remote-start override distinct from
    /// their ordinary data registers, generalized from `dse.py`'s
    /// `has_remote_start`/`RemoteStartModeAutomatic` handling. `None`
    /// means the driver has no such control.
    fn remote_start_override(&self) -> Option<bool> {
        None
    }

    /// Auxiliary reads run before `info_registers`/`data_registers`,
    /// for drivers that need to know something about the device (e.g.
    /// a phase count) to decide their own register layout but don't
    /// want that fact published as an info path itself. Default is a
    /// no-op so existing drivers need no changes to keep compiling.
    async fn device_init(
        &self,
        _client: &ClientHandle,
        _info: &mut HashMap<String, RegisterValue>,
    ) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Runs once `init` has published every info, data, standard, and
    /// sub-device path, letting a driver register paths whose
    /// existence couldn't be known any earlier. Default is a no-op.
    async fn device_init_late(
        &self,
        _bus: &SharedBus,
        _service: &str,
    ) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Sub-device blueprints to instantiate under this device,
    /// generalized from `dse.py`'s day-tank `SubDevice`. Default is
    /// none.
    fn sub_devices(&self, _settings: &DeviceSettings) -> Vec<SubDeviceBlueprint> {
        Vec::new()
    }
}
