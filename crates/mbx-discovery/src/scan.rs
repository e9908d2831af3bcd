//! Network and serial scanning.
//!
//! Grounded on `scan.py`'s `Scanner` (network scan, one worker
//! generalized to the spec's 8-worker pool) and `utils.py`'s
//! `get_networks`, plus spec.md §4.7.2's two-phase serial scan.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mbx_core::devspec::TransportMethod;
use mbx_core::timing::{SCAN_PROBE_TIMEOUT, SCAN_WORKERS, SERIAL_SCAN_SETTLE};
use mbx_core::DeviceSpec;
use mbx_probe::{probe, ProbeMatch, ProbeRegistry};
use mbx_transport::ClientPool;
use tokio::sync::{mpsc, Mutex};

use crate::error::ScanError;

pub type FoundDevice = (DeviceSpec, ProbeMatch);

/// Enumerates the host's globally-scoped IPv4 networks, excluding
/// blacklisted interface names and the host's own addresses, and
/// builds one `DeviceSpec` candidate per (network host × protocol).
/// Grounded on `utils.py`'s `get_networks` plus `Scanner.scan`'s
/// `[['tcp', str(h), self.port, self.unit] for h in hosts]`.
pub fn enumerate_candidates(
    blacklist: &[String],
    port: u16,
    unit: u8,
) -> Result<Vec<DeviceSpec>, ScanError> {
    let interfaces = get_if_addrs::get_if_addrs()?;
    let mut own = HashSet::new();
    let mut networks: HashSet<(Ipv4Addr, Ipv4Addr)> = HashSet::new();

    for iface in &interfaces {
        if blacklist.iter().any(|b| b == &iface.name) {
            continue;
        }
        if let get_if_addrs::IfAddr::V4(v4) = &iface.addr {
            if v4.ip.is_loopback() || !is_global_scope(v4.ip) {
                continue;
            }
            own.insert(v4.ip);
            networks.insert((v4.ip, v4.netmask));
        }
    }

    if networks.is_empty() {
        return Err(ScanError::NoNetworks);
    }

    let mut candidates = Vec::new();
    for (ip, mask) in networks {
        for host in network_hosts(ip, mask) {
            if own.contains(&host) {
                continue;
            }
            candidates.push(DeviceSpec::Net {
                method: TransportMethod::Tcp,
                host: host.to_string(),
                port,
                unit,
            });
            candidates.push(DeviceSpec::Net {
                method: TransportMethod::Udp,
                host: host.to_string(),
                port,
                unit,
            });
        }
    }
    Ok(candidates)
}

fn is_global_scope(ip: Ipv4Addr) -> bool {
    !ip.is_loopback() && !ip.is_link_local() && !ip.is_unspecified()
}

/// Host addresses within the network `ip/mask`, excluding the network
/// and broadcast addresses. Point-to-point (/31, /32) links yield no
/// scannable hosts.
fn network_hosts(ip: Ipv4Addr, mask: Ipv4Addr) -> Vec<Ipv4Addr> {
    let ip_u = u32::from(ip);
    let mask_u = u32::from(mask);
    if mask_u.count_zeros() <= 1 {
        return Vec::new();
    }
    let network = ip_u & mask_u;
    let broadcast = network | !mask_u;
    ((network + 1)..broadcast).map(Ipv4Addr::from).collect()
}

/// Scan progress, polled by the supervisor's bus exposure of scan state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanProgress {
    pub done: usize,
    pub total: usize,
}

/// Runs a full network scan: candidate enumeration, then an 8-worker
/// pool (bounded queue, capacity matching `SCAN_WORKERS`) each probing
/// one candidate at a time under `SCAN_PROBE_TIMEOUT`. `running` is
/// polled cooperatively; clearing it aborts the scan promptly, matching
/// `Scanner.progress`'s `ScanAborted` check.
pub async fn run_network_scan(
    pool: Arc<ClientPool>,
    registry: Arc<ProbeRegistry>,
    port: u16,
    unit: u8,
    blacklist: &[String],
    running: Arc<AtomicBool>,
    progress: Option<mpsc::Sender<ScanProgress>>,
) -> Result<Vec<FoundDevice>, ScanError> {
    let candidates = enumerate_candidates(blacklist, port, unit)?;
    let total = candidates.len();
    let done = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let (tx, rx) = mpsc::channel::<DeviceSpec>(SCAN_WORKERS);
    let rx = Arc::new(Mutex::new(rx));
    let found: Arc<Mutex<Vec<FoundDevice>>> = Arc::new(Mutex::new(Vec::new()));

    let mut workers = Vec::with_capacity(SCAN_WORKERS);
    for _ in 0..SCAN_WORKERS {
        let rx = rx.clone();
        let pool = pool.clone();
        let registry = registry.clone();
        let found = found.clone();
        let running = running.clone();
        let progress = progress.clone();
        let done = done.clone();

        workers.push(tokio::spawn(async move {
            loop {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let spec = {
                    let mut rx = rx.lock().await;
                    rx.recv().await
                };
                let Some(spec) = spec else { break };

                let attempt = tokio::time::timeout(
                    SCAN_PROBE_TIMEOUT,
                    probe(&pool, std::slice::from_ref(&spec), &registry, None),
                )
                .await;
                if let Ok(Ok(outcome)) = attempt {
                    if let Some(m) = outcome.found.into_iter().next() {
                        found.lock().await.push(m);
                    }
                }

                done.fetch_add(1, Ordering::SeqCst);
                if let Some(p) = &progress {
                    let _ = p
                        .send(ScanProgress {
                            done: done.load(Ordering::SeqCst),
                            total,
                        })
                        .await;
                }
            }
        }));
    }

    for spec in candidates {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        if tx.send(spec).await.is_err() {
            break;
        }
    }
    drop(tx);

    for w in workers {
        let _ = w.await;
    }

    if !running.load(Ordering::SeqCst) {
        return Err(ScanError::Aborted);
    }

    Ok(Arc::try_unwrap(found)
        .map(|m| m.into_inner())
        .unwrap_or_default())
}

/// Serial quick-rate phase: for each candidate rate, in order, probes
/// the union of handler-declared units; the first rate at which
/// anything matches fixes the rate for the rest of the session.
/// Grounded on spec.md §4.7.2.
pub async fn serial_scan_quick(
    pool: &ClientPool,
    registry: &ProbeRegistry,
    tty: &str,
    rates: &[u32],
) -> Result<Option<(u32, Vec<FoundDevice>)>, ScanError> {
    for &rate in rates {
        let units = registry.units_for_method(TransportMethod::Rtu);
        let candidates: Vec<DeviceSpec> = units
            .iter()
            .map(|&unit| DeviceSpec::Serial {
                method: TransportMethod::Rtu,
                tty: tty.to_string(),
                rate,
                unit,
            })
            .collect();
        let outcome = probe(pool, &candidates, registry, None).await?;
        if !outcome.found.is_empty() {
            return Ok(Some((rate, outcome.found)));
        }
    }
    Ok(None)
}

/// Serial full phase: sweeps the remaining unit ids 1..=247 at the
/// already-fixed rate, sleeping `SERIAL_SCAN_SETTLE` between
/// successful finds to let the bus re-arbitrate.
pub async fn serial_scan_full(
    pool: &ClientPool,
    registry: &ProbeRegistry,
    tty: &str,
    rate: u32,
    already_found: &[u8],
) -> Result<Vec<FoundDevice>, ScanError> {
    let mut found = Vec::new();
    for unit in 1u8..=247 {
        if already_found.contains(&unit) {
            continue;
        }
        let spec = DeviceSpec::Serial {
            method: TransportMethod::Rtu,
            tty: tty.to_string(),
            rate,
            unit,
        };
        let outcome = probe(pool, std::slice::from_ref(&spec), registry, None).await?;
        if let Some(m) = outcome.found.into_iter().next() {
            found.push(m);
            tokio::time::sleep(SERIAL_SCAN_SETTLE).await;
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_hosts_excludes_network_and_broadcast() {
        let ip: Ipv4Addr = "192.168.1.10".parse().unwrap();
        let mask: Ipv4Addr = "255.255.255.0".parse().unwrap();
        let hosts = network_hosts(ip, mask);
        assert_eq!(hosts.len(), 253);
        assert!(!hosts.contains(&"192.168.1.0".parse().unwrap()));
        assert!(!hosts.contains(&"192.168.1.255".parse().unwrap()));
        assert!(hosts.contains(&"192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn point_to_point_mask_yields_no_hosts() {
        let ip: Ipv4Addr = "10.0.0.1".parse().unwrap();
        let mask: Ipv4Addr = "255.255.255.255".parse().unwrap();
        assert!(network_hosts(ip, mask).is_empty());
    }

    #[test]
    fn link_local_addresses_are_not_global_scope() {
        assert!(!is_global_scope("169.254.1.1".parse().unwrap()));
        assert!(is_global_scope("192.168.1.1".parse().unwrap()));
    }

    #[tokio::test]
    async fn aborted_scan_before_any_send_reports_aborted() {
        let pool = Arc::new(ClientPool::new());
        let registry = Arc::new(ProbeRegistry::new());
        let running = Arc::new(AtomicBool::new(false));
        let result =
            run_network_scan(pool, registry, 502, 0, &[], running, None).await;
        // with `running` already false, enumerate_candidates may still
        // succeed (this host likely has at least one interface), but the
        // send loop should bail out immediately and report Aborted.
        if let Err(e) = result {
            assert!(matches!(e, ScanError::Aborted | ScanError::NoNetworks));
        }
    }
}
