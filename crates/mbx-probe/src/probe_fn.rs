//! The top-level `probe()` entry point: given a set of candidate
//! addresses, tries every applicable handler and returns which
//! addresses matched a known device and which didn't.
//!
//! Grounded on `probe.py`'s `probe(mlist, pr_cb, pr_interval, timeout,
//! filt)`: per-spec candidate-unit iteration, first-match-wins,
//! `modbus.put()` always released, and a batched progress callback.

use mbx_core::devspec::TransportMethod;
use mbx_core::DeviceSpec;
use mbx_register::AccessKind;
use mbx_transport::ClientPool;

use crate::error::ProbeError;
use crate::registry::ProbeRegistry;

#[derive(Debug, Clone)]
pub struct ProbeMatch {
    pub model: String,
    pub driver_id: String,
    pub access: AccessKind,
}

#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub found: Vec<(DeviceSpec, ProbeMatch)>,
    pub failed: Vec<DeviceSpec>,
}

/// Probes every candidate spec in `candidates`, trying each
/// registry-declared unit when a spec doesn't name one (`unit() == 0`)
/// and reporting progress once per candidate via `progress`.
pub async fn probe(
    pool: &ClientPool,
    candidates: &[DeviceSpec],
    registry: &ProbeRegistry,
    progress: Option<&(dyn Fn(usize) + Send + Sync)>,
) -> Result<ProbeOutcome, ProbeError> {
    let mut found = Vec::new();
    let mut failed = Vec::new();

    for spec in candidates {
        let handlers = registry.handlers_for_method(spec.method());
        let units: Vec<u8> = if spec.unit() != 0 {
            vec![spec.unit()]
        } else {
            registry.units_for_method(spec.method())
        };

        let mut matched = false;
        'units: for unit in units {
            let candidate = spec.with_unit(unit);
            let client = match open_client(pool, &candidate).await {
                Ok(c) => c,
                Err(_) => continue,
            };
            for handler in &handlers {
                if let Ok(Some(m)) = handler.try_match(&candidate, &client).await {
                    found.push((candidate.clone(), m));
                    matched = true;
                    break 'units;
                }
            }
            // `client` drops here, releasing its refcount/connection
            // unconditionally — matches `probe.py`'s `modbus.put()`
            // placement regardless of match outcome.
        }

        if !matched {
            failed.push(spec.clone());
        }
        if let Some(p) = progress {
            p(1);
        }
    }

    Ok(ProbeOutcome { found, failed })
}

async fn open_client(
    pool: &ClientPool,
    spec: &DeviceSpec,
) -> Result<mbx_transport::ClientHandle, ProbeError> {
    let handle = match spec {
        DeviceSpec::Net {
            method: TransportMethod::Tcp,
            host,
            port,
            unit,
        } => pool.get_tcp(host, *port, *unit).await?,
        DeviceSpec::Net {
            method: TransportMethod::Udp,
            host,
            port,
            unit,
        } => pool.get_udp(host, *port, *unit).await?,
        DeviceSpec::Serial {
            tty, rate, unit, ..
        } => pool.get_serial(tty, *rate, *unit).await?,
        _ => return Err(ProbeError::Cancelled),
    };
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_with_no_candidates_returns_empty() {
        let pool = ClientPool::new();
        let registry = ProbeRegistry::new();
        let outcome = probe(&pool, &[], &registry, None).await.unwrap();
        assert!(outcome.found.is_empty());
        assert!(outcome.failed.is_empty());
    }

    #[tokio::test]
    async fn unreachable_tcp_candidate_is_reported_failed() {
        let pool = ClientPool::new();
        let registry = ProbeRegistry::new();
        // Port 1 is reserved and will refuse the connection immediately
        // on any CI/sandbox network namespace.
        let spec: DeviceSpec = "tcp:127.0.0.1:1:1".parse().unwrap();
        let outcome = probe(&pool, &[spec.clone()], &registry, None)
            .await
            .unwrap();
        assert!(outcome.found.is_empty());
        assert_eq!(outcome.failed, vec![spec]);
    }
}
