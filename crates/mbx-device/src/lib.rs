//! The device framework: register packing, the device lifecycle state
//! machine, the latency filter driving per-device timeouts, and
//! sub-devices (including tanks).
//!
//! Grounded on `device.py`'s `ModbusDevice` (`init`/`update`/
//! `read_info_regs`/`read_data_regs`) and the vendor drivers'
//! `device_init`/`dbus_write_register`/`sched_reinit` pattern.

mod capability;
mod device;
mod driver;
mod error;
mod latency;
mod lifecycle;
mod packing;
mod subdevice;

pub use capability::{HasCustomName, HasErrorId, HasVregLink};
pub use device::{Device, DeviceSettings};
pub use driver::DriverSpec;
pub use error::DeviceError;
pub use latency::LatencyFilter;
pub use lifecycle::DeviceState;
pub use packing::{hole_max, pack_registers, RegisterGroup};
pub use subdevice::{SubDevice, SubDeviceBlueprint, SubDeviceState, Tank};
