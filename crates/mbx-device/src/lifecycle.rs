//! Device lifecycle state machine.
//!
//! Grounded on `device.py`'s `ModbusDevice.__init__`/`init`/`update`
//! flow: a device starts uninitialized, becomes initialized once its
//! info registers are read and its data registers are published, can
//! be marked for a reinit by a write handler or a settings change
//! (`sched_reinit`), and is declared failed after update fails for
//! longer than the device can tolerate.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Uninitialized,
    Initialized,
    /// A write or settings change requires the device to be torn down
    /// and reinitialized before the next update.
    ReinitPending,
    /// Settings say this device is not enabled; its client connection
    /// has been released and `update` is a no-op until re-`init`.
    Disabled,
    Failed,
}

impl DeviceState {
    pub fn is_usable(self) -> bool {
        matches!(self, DeviceState::Initialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_initialized_is_usable() {
        assert!(DeviceState::Initialized.is_usable());
        assert!(!DeviceState::Uninitialized.is_usable());
        assert!(!DeviceState::ReinitPending.is_usable());
        assert!(!DeviceState::Disabled.is_usable());
        assert!(!DeviceState::Failed.is_usable());
    }
}
