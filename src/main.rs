use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use btleplug::platform::Manager;
use clap::Parser;
use log::info;
use tokio::signal::unix::{SignalKind, signal};

mod classic;
mod config;
mod gatt;
mod manager;
mod models;
mod registry;
mod scanner;

/// Scans for nearby bluetooth devices and keeps a refreshed view of
/// their battery levels.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Print snapshots as JSON lines instead of plain text.
    #[arg(long)]
    json: bool,

    /// Seconds between snapshot prints.
    #[arg(long, default_value_t = 10)]
    print_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let config = load_config(&args.config)?;

    let bt_manager = Arc::new(
        Manager::new()
            .await
            .context("initializing bluetooth manager")?,
    );

    let monitor = manager::Monitor::new(
        scanner::BleScanner::new(Arc::clone(&bt_manager)),
        gatt::GattProbe::new(Arc::clone(&bt_manager)),
        classic::PlatformClassicSource::new(config.classic_enabled()),
        config,
    );
    let handle = monitor.handle();
    let loop_task = tokio::spawn(monitor.run());

    let mut ticker = tokio::time::interval(Duration::from_secs(args.print_interval.max(1)));
    // SIGHUP maps to the user-visible "reset now" action.
    let mut refresh = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    loop {
        tokio::select! {
            _ = ticker.tick() => print_snapshot(&handle, args.json)?,
            _ = refresh.recv() => handle.request_manual_refresh(),
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                handle.request_stop();
                break;
            }
        }
    }

    loop_task.await.context("scan loop panicked")?;
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<config::AppConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::de::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!("no config at {}, using defaults", path.display());
            Ok(config::AppConfig::default())
        }
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

fn print_snapshot(handle: &manager::MonitorHandle, json: bool) -> anyhow::Result<()> {
    let snapshot = handle.snapshot();
    if json {
        println!("{}", serde_json::to_string(&snapshot)?);
        return Ok(());
    }

    println!(
        "cycle {}: {} devices, {} with battery",
        snapshot.cycle,
        snapshot.devices.len(),
        snapshot.batteries.len()
    );
    if let Some(err) = &snapshot.last_error {
        println!("  last error: {err}");
    }
    let mut devices: Vec<_> = snapshot.devices.values().collect();
    devices.sort_by(|a, b| a.name.cmp(&b.name).then(a.address.cmp(&b.address)));
    for device in devices {
        match snapshot.batteries.get(&device.address) {
            Some(level) => println!("  {} [{}] {}%", device.name, device.address, level),
            None => println!("  {} [{}] no battery reading", device.name, device.address),
        }
    }
    Ok(())
}
