//! Command line tool for Wallbox chargers
//!
//! Scans for chargers and talks to one over its BLE UART service: status,
//! lock, current and charging control, plus raw commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use log::*;
use serde_json::Value as JsonValue;
use wallbox_ble_controller::ble::{self, BtleConnector};
use wallbox_ble_controller::{EngineConfig, Method, ProtocolEngine, spawn_poller};

#[derive(Parser)]
#[command(name = "wallbox-ble")]
#[command(about = "Control Wallbox chargers over Bluetooth LE")]
struct Cli {
    /// Charger Bluetooth address or advertised name (e.g. WB123456)
    #[arg(short, long, global = true, env = "WALLBOX_ADDRESS")]
    address: Option<String>,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// How long to wait for the first connection, in seconds
    #[arg(long, global = true, default_value = "30")]
    connect_timeout: u64,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for chargers
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// List every device, not only chargers
        #[arg(long)]
        all: bool,
    },
    /// List the commands the charger understands
    Methods,
    #[command(flatten)]
    Charger(ChargerCommands),
}

/// Commands that need a connection to the charger
#[derive(Subcommand)]
enum ChargerCommands {
    /// Show charger status
    Status,
    /// Lock the charger
    Lock,
    /// Unlock the charger
    Unlock,
    /// Show or set the charging current
    Current {
        /// New charging current in amps
        amps: Option<u32>,
    },
    /// Start or stop charging
    Charge {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Send any command by name or opcode
    Command {
        /// Command name (see `methods`) or raw opcode
        method: Method,
        /// Parameter as JSON
        parameter: Option<String>,
    },
    /// Poll the charger and print every change
    Watch,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Scan { duration, all } => {
            scan_chargers(duration, all).await?;
        }
        Commands::Methods => {
            for method in Method::ALL {
                println!("  {:<36} {}", method.name(), method.opcode());
            }
        }
        Commands::Charger(command) => {
            let address = cli.address.ok_or("No charger given, use --address or WALLBOX_ADDRESS")?;
            let timeout = Duration::from_secs(cli.connect_timeout);
            let engine = Arc::new(connect(&address, &config, timeout).await?);

            let result = run(&engine, command, &config).await;
            engine.shutdown().await;
            result?;
        }
    }

    Ok(())
}

async fn connect(
    address: &str,
    config: &EngineConfig,
    timeout: Duration,
) -> Result<ProtocolEngine, Box<dyn std::error::Error>> {
    let connector = BtleConnector::new(address, config.scan_timeout());
    let engine = ProtocolEngine::start(connector, config);

    println!("Connecting to {}...", address);
    match tokio::time::timeout(timeout, engine.wait_ready()).await {
        Ok(ready) => ready?,
        Err(_) => {
            engine.shutdown().await;
            return Err(format!("Could not connect to {} within {:?}", address, timeout).into());
        }
    }
    println!("Connected!");
    Ok(engine)
}

async fn run(
    engine: &Arc<ProtocolEngine>,
    command: ChargerCommands,
    config: &EngineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        ChargerCommands::Status => {
            let report = engine.get_status().await?;
            println!("Status: {} ({})", report.status.description(), report.code);
            if let Some(current) = report.charge_current {
                println!("Charging current: {} A", current);
            }
            let max = engine.get_max_current().await?;
            println!("Max available current: {} A", max);
        }
        ChargerCommands::Lock => {
            engine.set_locked(true).await?;
            println!("Charger locked");
        }
        ChargerCommands::Unlock => {
            engine.set_locked(false).await?;
            println!("Charger unlocked");
        }
        ChargerCommands::Current { amps } => {
            let max = engine.get_max_current().await?;
            match amps {
                Some(amps) => {
                    engine.set_max_current(amps).await?;
                    println!("Charging current set to {} A (max {} A)", amps, max);
                }
                None => {
                    let report = engine.get_status().await?;
                    let current = report
                        .charge_current
                        .map(|c| format!("{} A", c))
                        .unwrap_or_else(|| "unknown".to_string());
                    println!("Charging current: {} (max {} A)", current, max);
                }
            }
        }
        ChargerCommands::Charge { state } => {
            let report = engine.get_status().await?;
            if !engine.snapshot().charging_controllable() {
                return Err(format!(
                    "Charging can not be switched while the charger is {}",
                    report.status.description()
                )
                .into());
            }
            let on = matches!(state, Switch::On);
            engine.set_charging(on).await?;
            println!("Charging {}", if on { "started" } else { "stopped" });
        }
        ChargerCommands::Command { method, parameter } => {
            let parameter = match parameter {
                Some(text) => serde_json::from_str(&text)?,
                None => JsonValue::Null,
            };
            let value = engine.command(method, parameter).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        ChargerCommands::Watch => watch(engine, config).await?,
    }
    Ok(())
}

async fn scan_chargers(duration: u64, all: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Scanning for chargers ({} seconds)...", duration);

    let devices = ble::scan(Duration::from_secs(duration)).await?;
    let shown: Vec<_> = devices.into_iter().filter(|d| all || d.is_wallbox).collect();

    println!("\nFound {} devices:", shown.len());
    for device in shown {
        let rssi = device.rssi.map(|r| format!("{} dBm", r)).unwrap_or_else(|| "N/A".to_string());
        let marker = if device.is_wallbox { " [WALLBOX]" } else { "" };
        println!("  {} ({}) RSSI: {}{}", device.name, device.address, rssi, marker);
    }
    Ok(())
}

async fn watch(engine: &Arc<ProtocolEngine>, config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut snapshots = engine.watch_snapshot();
    let mut connection = engine.watch_connection();
    let poller = spawn_poller(engine.clone(), config.poll_interval());

    println!("Watching, press Ctrl-C to stop");
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&snapshot)?);
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connection.borrow_and_update();
                info!("Connection {}", serde_json::to_string(&state)?);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.abort();
    Ok(())
}
