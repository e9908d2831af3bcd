//! Supervisor-level error types. Per-device and per-probe errors are
//! handled locally (logged, device evicted or retained) rather than
//! bubbling out of the tick loop, matching `dbus-modbus-client.py`'s
//! `update_timer`'s outer `try/except` that only guards against an
//! uncaught exception crashing the whole process.

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Scan(#[from] mbx_discovery::ScanError),
    #[error(transparent)]
    Mdns(#[from] mbx_discovery::MdnsError),
    #[error(transparent)]
    Probe(#[from] mbx_probe::ProbeError),
    #[error(transparent)]
    Device(#[from] mbx_device::DeviceError),
    #[error(transparent)]
    Transport(#[from] mbx_transport::TransportError),
    #[error("no driver catalog entry for driver id {0:?}")]
    UnknownDriver(String),
    #[error("no live device at {0}")]
    DeviceNotFound(String),
}
