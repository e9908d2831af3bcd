//! The supervisor: owns every live device, the background scanner and
//! mDNS listener, the failed-spec retry queue, and the watchdog.
//!
//! Grounded on `original_source/dbus-modbus-client.py`'s `Client`
//! class: `init`/`update`/`update_device`/`probe_devices`/
//! `update_devlist`/`save_devices`/`start_scan`/`scan_update`/
//! `scan_complete`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use mbx_core::bus::SharedBus;
use mbx_core::devspec::TransportMethod;
use mbx_core::timing::{
    FAILED_INTERVAL, FAIL_TIMEOUT, MDNS_CHECK_INTERVAL, SCAN_INTERVAL, WATCHDOG_TIMEOUT,
};
use mbx_core::{DeviceSpec, Role};
use mbx_device::{Device, DeviceSettings, DriverSpec};
use mbx_discovery::{
    enumerate_candidates, run_network_scan, FoundDevice, MdnsDiscoverer, ScanProgress,
};
use mbx_drivers::DriverCatalog;
use mbx_probe::{probe, ProbeMatch, ProbeRegistry};
use mbx_register::RegisterValue;
use mbx_transport::{ClientHandle, ClientPool};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::error::SupervisorError;
use crate::settings::{SettingsSnapshot, SettingsStore};
use crate::watchdog::Watchdog;

const MODBUS_TCP_PORT: u16 = 502;

struct ManagedDevice {
    device: Device,
    /// Transient devices (mDNS-discovered, not yet user-enabled) are
    /// never persisted to the settings store and are never carried
    /// into the `failed` retry list. Matches `ModbusDevice.nosave`.
    nosave: bool,
}

struct ScanHandle {
    running: Arc<AtomicBool>,
    progress_rx: mpsc::Receiver<ScanProgress>,
    progress: ScanProgress,
    handle: JoinHandle<Result<Vec<FoundDevice>, mbx_discovery::ScanError>>,
}

pub struct Supervisor {
    name: String,
    pool: Arc<ClientPool>,
    registry: Arc<ProbeRegistry>,
    catalog: DriverCatalog,
    bus: SharedBus,
    settings: Arc<dyn SettingsStore>,
    settings_rx: broadcast::Receiver<SettingsSnapshot>,
    devices: HashMap<DeviceSpec, ManagedDevice>,
    failed: Vec<DeviceSpec>,
    failed_time: Instant,
    scan: Option<ScanHandle>,
    scan_time: Instant,
    mdns: Option<Arc<MdnsDiscoverer>>,
    mdns_check_time: Instant,
    mdns_discovered: Vec<(DeviceSpec, ProbeMatch)>,
    watchdog: Watchdog,
    autoscan: bool,
    err_exit: bool,
    if_blacklist: Vec<String>,
}

impl Supervisor {
    pub fn new(
        name: impl Into<String>,
        pool: Arc<ClientPool>,
        registry: Arc<ProbeRegistry>,
        catalog: DriverCatalog,
        bus: SharedBus,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let settings_rx = settings.subscribe();
        Self {
            name: name.into(),
            pool,
            registry,
            catalog,
            bus,
            settings,
            settings_rx,
            devices: HashMap::new(),
            failed: Vec::new(),
            failed_time: Instant::now(),
            scan: None,
            scan_time: Instant::now(),
            mdns: None,
            mdns_check_time: Instant::now(),
            mdns_discovered: Vec::new(),
            watchdog: Watchdog::new(WATCHDOG_TIMEOUT),
            autoscan: false,
            err_exit: false,
            if_blacklist: vec!["ap0".to_string()],
        }
    }

    pub fn set_err_exit(&mut self, err_exit: bool) {
        self.err_exit = err_exit;
    }

    pub fn set_mdns(&mut self, mdns: Arc<MdnsDiscoverer>) {
        self.mdns = Some(mdns);
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn failed_specs(&self) -> &[DeviceSpec] {
        &self.failed
    }

    pub fn mdns_discovered(&self) -> &[(DeviceSpec, ProbeMatch)] {
        &self.mdns_discovered
    }

    pub fn scan_progress(&self) -> Option<ScanProgress> {
        self.scan.as_ref().map(|s| s.progress)
    }

    /// Startup sequence, matching `Client.init`: load the persisted
    /// device list, probe it, optionally kick off a scan, start the
    /// watchdog.
    pub async fn start(&mut self, force_scan: bool) {
        let snapshot = self.settings.snapshot().await;
        self.autoscan = snapshot.autoscan;
        self.update_devlist("", &snapshot.devices).await;

        let mut scan = force_scan;
        if (self.devices.is_empty() || !self.failed.is_empty()) && self.autoscan {
            scan = true;
        }
        if scan {
            self.start_scan(force_scan);
        }

        self.watchdog.start();
    }

    /// One supervisor tick, matching `Client.update`. Per-device and
    /// per-probe errors are handled inline (logged, device evicted or
    /// spec retained in `failed`) rather than propagated, matching the
    /// outer `try/except` in `update_timer` that only guards the whole
    /// loop against a truly uncaught exception.
    pub async fn tick(&mut self) {
        self.poll_settings_changes().await;
        self.poll_scan().await;
        self.poll_devices().await;
        self.poll_failed().await;
        self.poll_mdns().await;

        if self.autoscan
            && self.scan.is_none()
            && self.scan_time.elapsed() > SCAN_INTERVAL
        {
            self.start_scan(false);
        }

        self.watchdog.update();
    }

    async fn poll_settings_changes(&mut self) {
        let mut latest = None;
        while let Ok(snapshot) = self.settings_rx.try_recv() {
            latest = Some(snapshot);
        }
        if let Some(snapshot) = latest {
            self.autoscan = snapshot.autoscan;
        }
    }

    async fn poll_scan(&mut self) {
        let Some(scan) = self.scan.as_mut() else {
            return;
        };
        while let Ok(p) = scan.progress_rx.try_recv() {
            scan.progress = p;
        }
        if !scan.handle.is_finished() {
            return;
        }

        let scan = self.scan.take().unwrap();
        match scan.handle.await {
            Ok(Ok(found)) => self.scan_update(found).await,
            Ok(Err(e)) => tracing::warn!(error = %e, "scan ended with an error"),
            Err(e) => tracing::warn!(error = %e, "scan task panicked"),
        }
        self.scan_complete();
    }

    /// Initializes every newly-found device, matching `scan_update`.
    async fn scan_update(&mut self, found: Vec<FoundDevice>) {
        for (spec, m) in found {
            if self.devices.contains_key(&spec) {
                continue;
            }
            if let Err(e) = self.instantiate(spec.clone(), m, false).await {
                tracing::info!(spec = %spec, error = %e, "error initialising scanned device, skipping");
            }
        }
        self.save_devices().await;
    }

    fn scan_complete(&mut self) {
        self.scan_time = Instant::now();
        if self.devices.is_empty() && self.err_exit {
            std::process::exit(1);
        }
    }

    async fn poll_devices(&mut self) {
        let mut to_evict = Vec::new();
        for (spec, managed) in self.devices.iter_mut() {
            if let Err(e) = managed.device.update(&self.bus).await {
                let stale = managed.device.last_success().elapsed() > FAIL_TIMEOUT;
                if stale {
                    tracing::warn!(spec = %spec, error = %e, "device failed, evicting");
                    to_evict.push(spec.clone());
                }
            }
        }

        for spec in to_evict {
            if let Some(managed) = self.devices.remove(&spec) {
                if self.err_exit {
                    std::process::exit(1);
                }
                self.bus.remove_service(&managed.device.service).await;
                if !managed.nosave {
                    self.failed.push(spec);
                }
            }
        }
        self.save_devices().await;
    }

    async fn poll_failed(&mut self) {
        if self.failed.is_empty() || self.failed_time.elapsed() <= FAILED_INTERVAL {
            return;
        }
        let specs: HashSet<DeviceSpec> = self.failed.drain(..).collect();
        self.failed = self.probe_devices(specs, false).await;
        self.failed_time = Instant::now();
        self.save_devices().await;
    }

    async fn poll_mdns(&mut self) {
        let Some(mdns) = self.mdns.clone() else {
            return;
        };
        if self.mdns_check_time.elapsed() <= MDNS_CHECK_INTERVAL {
            return;
        }
        self.mdns_check_time = Instant::now();

        let services = mdns.drain().await;
        if services.is_empty() {
            return;
        }
        let candidates: Vec<DeviceSpec> = services
            .into_iter()
            .map(|(ip, port)| DeviceSpec::Net {
                method: TransportMethod::Tcp,
                host: ip.to_string(),
                port,
                unit: 0,
            })
            .filter(|spec| !self.devices.contains_key(spec))
            .collect();
        if candidates.is_empty() {
            return;
        }

        match probe(&self.pool, &candidates, &self.registry, None).await {
            Ok(outcome) => {
                for m in outcome.found {
                    if !self
                        .mdns_discovered
                        .iter()
                        .any(|(spec, _)| *spec == m.0)
                    {
                        self.mdns_discovered.push(m);
                    }
                }
            }
            Err(e) => tracing::debug!(error = %e, "mdns candidate probe failed"),
        }
    }

    /// Diffs an old and new comma-separated device-spec list, matching
    /// `update_devlist`: removed specs are destroyed, the full new set
    /// is (re)probed.
    pub async fn update_devlist(&mut self, old: &str, new: &str) {
        let old_specs = mbx_core::devspec::from_strings(old.split(',').filter(|s| !s.is_empty()));
        let new_specs = mbx_core::devspec::from_strings(new.split(',').filter(|s| !s.is_empty()));

        let removed: Vec<DeviceSpec> = old_specs.difference(&new_specs).cloned().collect();
        for spec in removed {
            if let Some(managed) = self.devices.remove(&spec) {
                self.bus.remove_service(&managed.device.service).await;
            }
        }

        self.failed = self.probe_devices(new_specs, false).await;
        self.save_devices().await;
    }

    /// Probes every spec not already live, instantiates the matches,
    /// and returns the specs that failed to match anything. Matches
    /// `probe_devices`.
    async fn probe_devices(
        &mut self,
        specs: HashSet<DeviceSpec>,
        nosave: bool,
    ) -> Vec<DeviceSpec> {
        let candidates: Vec<DeviceSpec> = specs
            .into_iter()
            .filter(|s| !self.devices.contains_key(s))
            .collect();

        let outcome = match probe(&self.pool, &candidates, &self.registry, None).await {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(error = %e, "probe_devices: probe() failed entirely");
                return candidates;
            }
        };

        let mut failed = outcome.failed;
        for (spec, m) in outcome.found {
            if let Err(e) = self.instantiate(spec.clone(), m, nosave).await {
                tracing::info!(spec = %spec, error = %e, "error initialising probed device, skipping");
                failed.push(spec);
            }
        }
        failed
    }

    async fn instantiate(
        &mut self,
        spec: DeviceSpec,
        m: ProbeMatch,
        nosave: bool,
    ) -> Result<(), SupervisorError> {
        let driver = self
            .catalog
            .get(&m.driver_id)
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownDriver(m.driver_id.clone()))?;

        let client = self.open_client(&spec).await?;
        let service = service_name(driver.default_role(), &m.driver_id, &spec);
        let mut device = Device::new(spec.clone(), service, driver, client, m.model.clone());
        let settings = DeviceSettings::default();
        device.init(&self.bus, &settings, !nosave).await?;

        self.devices.insert(spec, ManagedDevice { device, nosave });
        Ok(())
    }

    async fn open_client(&self, spec: &DeviceSpec) -> Result<ClientHandle, SupervisorError> {
        let handle = match spec {
            DeviceSpec::Net {
                method: TransportMethod::Tcp,
                host,
                port,
                unit,
            } => self.pool.get_tcp(host, *port, *unit).await?,
            DeviceSpec::Net {
                method: TransportMethod::Udp,
                host,
                port,
                unit,
            } => self.pool.get_udp(host, *port, *unit).await?,
            DeviceSpec::Serial {
                tty, rate, unit, ..
            } => self.pool.get_serial(tty, *rate, *unit).await?,
            _ => return Err(SupervisorError::Transport(mbx_transport::TransportError::Cancelled)),
        };
        Ok(handle)
    }

    /// Persists the current device list plus still-failing specs,
    /// matching `save_devices`: only devices with `nosave == false`
    /// are included, and the write is skipped if nothing changed.
    async fn save_devices(&self) {
        let mut specs: Vec<String> = self
            .devices
            .iter()
            .filter(|(_, m)| !m.nosave)
            .map(|(spec, _)| spec.to_string())
            .chain(self.failed.iter().map(|s| s.to_string()))
            .collect();
        specs.sort();
        let joined = specs.join(",");

        if self.settings.snapshot().await.devices != joined {
            self.settings.set_devices(joined).await;
        }
    }

    pub fn start_scan(&mut self, _full: bool) {
        if self.scan.is_some() {
            return;
        }
        let running = Arc::new(AtomicBool::new(true));
        let (progress_tx, progress_rx) = mpsc::channel(16);
        let pool = self.pool.clone();
        let registry = self.registry.clone();
        let blacklist = self.if_blacklist.clone();
        let running_task = running.clone();

        let handle = tokio::spawn(async move {
            run_network_scan(
                pool,
                registry,
                MODBUS_TCP_PORT,
                1,
                &blacklist,
                running_task,
                Some(progress_tx),
            )
            .await
        });

        self.scan = Some(ScanHandle {
            running,
            progress_rx,
            progress: ScanProgress::default(),
            handle,
        });
        tracing::info!("starting background scan");
    }

    pub fn stop_scan(&mut self) {
        if let Some(scan) = &self.scan {
            scan.running.store(false, Ordering::SeqCst);
        }
    }

    /// One-shot candidate enumeration without launching the worker
    /// pool, used by the CLI's `--models`/probe-only paths.
    pub fn enumerate_network_candidates(&self, port: u16, unit: u8) -> Vec<DeviceSpec> {
        enumerate_candidates(&self.if_blacklist, port, unit).unwrap_or_default()
    }

    pub async fn write(
        &mut self,
        spec: &DeviceSpec,
        path: &str,
        value: RegisterValue,
    ) -> Result<(), SupervisorError> {
        let managed = self
            .devices
            .get_mut(spec)
            .ok_or_else(|| SupervisorError::DeviceNotFound(spec.to_string()))?;
        managed.device.write(path, value).await?;
        Ok(())
    }
}

/// Builds the per-device object-bus service name, matching spec.md
/// §6's `com.victronenergy.<role>.<vendor_id>_<serial>` — the trailing
/// identifier falls back to the spec's own display form when a serial
/// hasn't been read yet (or the driver has none), rather than blocking
/// service registration on it.
fn service_name(role: Role, driver_id: &str, spec: &DeviceSpec) -> String {
    let ident = spec.to_string().replace([':', '.'], "_");
    format!("com.victronenergy.{role}.{driver_id}_{ident}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_follows_role_vendor_ident_shape() {
        let spec: DeviceSpec = "tcp:192.168.1.5:502:1".parse().unwrap();
        let name = service_name(Role::Grid, "cg_em24", &spec);
        assert_eq!(name, "com.victronenergy.grid.cg_em24_tcp_192_168_1_5_502_1");
    }
}
