use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use genial_t31_bridge_lib::config::{AppConfig, CONFIG_FILE_NAME};
use genial_t31_bridge_lib::{BluetoothManager, BridgeHandle, Sensor, Supervisor, logging};

/// Keeps a Genial T31 thermometer connected and logs its readings.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path of the JSON config file
    #[arg(long, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// MAC address of the thermometer, overrides the config file
    #[arg(long)]
    mac: Option<String>,

    /// Display name, overrides the config file
    #[arg(long)]
    name: Option<String>,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,

    /// Write the merged configuration back to --config
    #[arg(long)]
    write_config: bool,

    /// List nearby thermometers and exit
    #[arg(long)]
    discover: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level);

    let mut config = AppConfig::load_config(&cli.config).await?;
    if let Some(mac) = cli.mac {
        config.device.mac_address = mac;
    }
    if let Some(name) = cli.name {
        config.device.name = name;
    }

    if cli.discover {
        let transport = BluetoothManager::new(&config.timing).await?;
        let devices = transport.discover(config.timing.scan_timeout()).await?;
        if devices.is_empty() {
            warn!("No Genial T31 thermometer found nearby");
        }
        for device in devices {
            info!("{} ({})", device.name, device.address);
        }
        return Ok(());
    }

    let identity = config
        .device
        .identity()
        .context("A valid MAC address is required, pass --mac or set device.mac_address")?;

    if cli.write_config {
        config.save_config(&cli.config).await?;
    }

    info!("Starting bridge for {} ({})", identity.name, identity.address);
    let transport = BluetoothManager::new(&config.timing).await?;
    let sensors = Sensor::all(&identity);

    let mut supervisor = Supervisor::new(transport, identity, config.timing.clone());
    let mut snapshots = supervisor.subscribe();
    supervisor.set_listener(Box::new(|snapshot| match serde_json::to_string(snapshot) {
        Ok(json) => debug!("Published snapshot: {}", json),
        Err(e) => warn!("Failed to serialize snapshot: {}", e),
    }));
    let bridge = BridgeHandle::spawn(supervisor);

    let mut last_rendered = Vec::new();
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    warn!("Supervisor stopped publishing");
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                let rendered: Vec<String> = sensors.iter().map(|s| s.render(&snapshot)).collect();
                if rendered != last_rendered {
                    for line in &rendered {
                        info!("{}", line);
                    }
                    last_rendered = rendered;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received");
                break;
            }
        }
    }

    bridge.shutdown().await;
    Ok(())
}
