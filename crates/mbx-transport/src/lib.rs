//! The Modbus client pool: opens and refcounts connections to
//! candidate devices across TCP, UDP, and serial (RTU/ASCII)
//! transports.
//!
//! Grounded on `client.py`'s `RefCount`/`TcpClient`/`UdpClient`/
//! `SerialClient`/`make_client`: TCP and UDP clients are cheap and
//! opened fresh on every request; serial clients are deduplicated by
//! tty basename in a shared registry, since a serial line can only
//! sustain one conversation at a time and re-opening it on every probe
//! would both be slow and risk conflicting baud rates.
//!
//! Framing itself is delegated to `tokio-modbus` (the assumed
//! compliant Modbus client library, per spec.md §1 Non-goals) and
//! `tokio-serial` for the underlying serial port.

mod error;
mod handle;
mod pool;
mod timeout_guard;
mod warmup;

pub use error::TransportError;
pub use handle::ClientHandle;
pub use pool::ClientPool;
pub use timeout_guard::TimeoutGuard;
pub use warmup::{compute_crc16_modbus, warmup_frame};
