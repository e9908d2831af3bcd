//! Command-line entry point for the Modbus discovery and bridge daemon.
//!
//! Grounded on `original_source/dbus-modbus-client.py`'s `main`
//! (argument surface, logging setup, `SerialClient`/`NetClient`
//! selection) and `neomind-cli`'s `main.rs` (clap derive shape,
//! `tracing-subscriber` initialization).

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use mbx_core::bus::{LocalBus, SharedBus};
use mbx_core::devspec::TransportMethod;
use mbx_core::timing::{SERIAL_SCAN_SETTLE, UPDATE_INTERVAL};
use mbx_core::DeviceSpec;
use mbx_device::DriverSpec;
use mbx_discovery::{serial_scan_full, serial_scan_quick};
use mbx_drivers::DriverCatalog;
use mbx_probe::{probe, ProbeRegistry};
use mbx_supervisor::{InMemorySettingsStore, SettingsStore, Supervisor};
use mbx_transport::ClientPool;

const DEFAULT_SERIAL_RATES: [u32; 3] = [9600, 19200, 115200];

/// Discovers and bridges Modbus TCP/UDP/RTU devices onto the object bus.
#[derive(Parser, Debug)]
#[command(name = "modbus-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,

    /// Unconditional scan at startup, even with a non-empty saved device list.
    #[arg(short, long = "force-scan")]
    force_scan: bool,

    /// Serial framing mode.
    #[arg(short, long, value_enum, default_value_t = SerialMode::Rtu)]
    mode: SerialMode,

    /// Restrict serial scan candidates to this baud rate; repeatable.
    #[arg(short, long = "rate")]
    rate: Vec<u32>,

    /// Serial-only mode: scan and bridge the given tty instead of the network.
    #[arg(short, long)]
    serial: Option<String>,

    /// List the driver catalog's supported vendor/model ids and exit.
    #[arg(long)]
    models: bool,

    /// One-shot probe of a single device spec (e.g. `tcp:192.168.1.5:502:1`);
    /// print the match, if any, and exit.
    #[arg(short = 'P', long)]
    probe: Option<String>,

    /// Exit the process if any managed device fails.
    #[arg(short = 'x', long = "exit")]
    exit_on_failure: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SerialMode {
    Rtu,
    Ascii,
}

impl From<SerialMode> for TransportMethod {
    fn from(mode: SerialMode) -> Self {
        match mode {
            SerialMode::Rtu => TransportMethod::Rtu,
            SerialMode::Ascii => TransportMethod::Ascii,
        }
    }
}

impl std::fmt::Display for SerialMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_possible_value()
            .expect("SerialMode has no skipped variants")
            .get_name()
            .fmt(f)
    }
}

fn init_logging(debug: bool) {
    let default_directive = if debug { "mbx=debug" } else { "mbx=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let (registry, catalog) = mbx_drivers::build_registry();

    if args.models {
        print_models(&catalog);
        return Ok(());
    }

    let pool = Arc::new(ClientPool::new());
    let registry = Arc::new(registry);

    if let Some(spec_str) = &args.probe {
        return run_probe(&pool, &registry, spec_str).await;
    }

    let bus: SharedBus = Arc::new(LocalBus::new());
    let settings = Arc::new(InMemorySettingsStore::default());

    if let Some(tty) = &args.serial {
        let rates: Vec<u32> = if args.rate.is_empty() {
            DEFAULT_SERIAL_RATES.to_vec()
        } else {
            args.rate.clone()
        };
        tracing::info!(tty, mode = %args.mode, ?rates, "scanning serial line");
        seed_serial_devices(&pool, &registry, tty, &rates, &settings).await?;
    }

    let mut supervisor = Supervisor::new(
        "mbx",
        pool.clone(),
        registry.clone(),
        catalog,
        bus,
        settings.clone(),
    );
    supervisor.set_err_exit(args.exit_on_failure);

    if args.serial.is_none() {
        supervisor.set_mdns(Arc::new(
            mbx_discovery::MdnsDiscoverer::new().context("failed to start mDNS discoverer")?,
        ));
    }

    supervisor.start(args.force_scan).await;

    let mut ticker = tokio::time::interval(UPDATE_INTERVAL);
    loop {
        ticker.tick().await;
        supervisor.tick().await;
    }
}

/// Prints the driver catalog, matching the `--models` listing mode.
fn print_models(catalog: &DriverCatalog) {
    println!("{:<20} {:<12} {}", "DRIVER ID", "ROLE", "VENDOR");
    let mut ids: Vec<&String> = catalog.keys().collect();
    ids.sort();
    for id in ids {
        let driver = &catalog[id];
        println!(
            "{:<20} {:<12} {}",
            id,
            driver.default_role(),
            driver.vendor_id()
        );
    }
}

/// One-shot probe of a single device spec, matching `probe.py`'s
/// command-line probe mode: open the client, try every registered
/// handler, print the match (or report failure), and exit. The client
/// is released via `ClientHandle`'s `Drop` on every exit path.
async fn run_probe(pool: &ClientPool, registry: &ProbeRegistry, spec_str: &str) -> Result<()> {
    let spec: DeviceSpec = spec_str
        .parse()
        .with_context(|| format!("invalid device spec {spec_str:?}"))?;

    let outcome = probe(pool, std::slice::from_ref(&spec), registry, None).await?;
    match outcome.found.into_iter().next() {
        Some((spec, m)) => {
            println!("{spec}: model={} driver={}", m.model, m.driver_id);
            Ok(())
        }
        None => {
            println!("{spec}: no match");
            std::process::exit(1);
        }
    }
}

/// Determines the serial line's baud rate and initial device list
/// before handing off to the supervisor, matching `SerialClient`'s use
/// of `SerialScanner` ahead of the regular `Client.init` path: a quick
/// per-rate probe first, then a full unit sweep at the rate that
/// answered, settling between sweeps so a slow device has time to
/// respond.
async fn seed_serial_devices(
    pool: &ClientPool,
    registry: &ProbeRegistry,
    tty: &str,
    rates: &[u32],
    settings: &InMemorySettingsStore,
) -> Result<()> {
    let Some((rate, quick_found)) = serial_scan_quick(pool, registry, tty, rates).await? else {
        bail!("no response from {tty} at any of {rates:?}");
    };

    tokio::time::sleep(SERIAL_SCAN_SETTLE).await;

    let already: Vec<u8> = quick_found.iter().map(|(spec, _)| spec.unit()).collect();
    let mut full_found = serial_scan_full(pool, registry, tty, rate, &already).await?;
    full_found.extend(quick_found);

    let devices: Vec<String> = full_found.iter().map(|(spec, _)| spec.to_string()).collect();
    if devices.is_empty() {
        bail!("no devices answered on {tty} at {rate} baud");
    }
    settings.set_devices(devices.join(",")).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_mode_maps_to_rtu_or_ascii_transport() {
        assert_eq!(TransportMethod::from(SerialMode::Rtu), TransportMethod::Rtu);
        assert_eq!(TransportMethod::from(SerialMode::Ascii), TransportMethod::Ascii);
    }
}
