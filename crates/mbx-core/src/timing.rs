//! Shared timing constants used by the device framework and
//! supervisor. Values per spec.md §4.9/§4.10, grounded on
//! `original_source/watchdog.py` and the supervisor loop cadence
//! described there.

use std::time::Duration;

/// Supervisor tick period.
pub const UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// How long a device may go without a successful update before it is
/// considered failed and evicted.
pub const FAIL_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimum spacing between reprobe attempts of a failed device spec.
pub const FAILED_INTERVAL: Duration = Duration::from_secs(10);

/// Period between automatic full rescans.
pub const SCAN_INTERVAL: Duration = Duration::from_secs(600);

/// Watchdog stall threshold; grounded on `watchdog.py`'s `timeout = 30`.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounded channel / worker pool size for network scanning.
pub const SCAN_WORKERS: usize = 8;

/// Settle delay between serial unit finds during a full sweep.
pub const SERIAL_SCAN_SETTLE: Duration = Duration::from_secs(1);

/// Default per-candidate probe timeout during a network scan.
pub const SCAN_PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// How often the supervisor drains the mDNS found-set.
pub const MDNS_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Steady-state mDNS query cadence once at least one response has been seen.
pub const MDNS_QUERY_INTERVAL: Duration = Duration::from_secs(60);

/// mDNS query cadence before any response has been seen, for faster
/// first discovery.
pub const MDNS_INITIAL_QUERY_INTERVAL: Duration = Duration::from_secs(6);
