//! The supervisor: the main tick loop that owns every live device, the
//! background network/serial scanner, the mDNS listener, the
//! failed-device retry queue, and the watchdog.
//!
//! Grounded on `original_source/dbus-modbus-client.py`'s `Client`
//! class and `original_source/watchdog.py`.

mod error;
mod settings;
mod supervisor;
mod watchdog;

pub use error::SupervisorError;
pub use settings::{InMemorySettingsStore, SettingsSnapshot, SettingsStore};
pub use supervisor::Supervisor;
pub use watchdog::Watchdog;
