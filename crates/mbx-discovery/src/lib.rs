//! Device discovery: network scanning, serial scanning, and mDNS
//! listening — the three ways the supervisor learns about candidate
//! devices it hasn't been told about explicitly.

mod error;
mod mdns;
mod scan;

pub use error::{MdnsError, ScanError};
pub use mdns::{FoundService, MdnsDiscoverer};
pub use scan::{
    enumerate_candidates, run_network_scan, serial_scan_full, serial_scan_quick, FoundDevice,
    ScanProgress,
};
