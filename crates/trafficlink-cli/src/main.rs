//! Command-line interface for the TrafficLink command dispatch service.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use trafficlink_commands::CommandQueue;
use trafficlink_core::AppConfig;
use trafficlink_devices::{DeviceRegistry, NewDevice};
use trafficlink_storage::Database;

/// TrafficLink - command dispatch and device state for traffic sensors.
#[derive(Parser, Debug)]
#[command(name = "trafficlink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Configuration file. Defaults to ./config.toml when present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding config and environment.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server.
    Serve {
        /// Host to bind to.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to.
        #[arg(short, long)]
        port: Option<u16>,
        /// Poll lease in seconds, 0 disables claiming.
        #[arg(long)]
        claim_lease_secs: Option<u64>,
        /// Accept device calls without an API key.
        #[arg(long)]
        no_device_key: bool,
    },
    /// Register a device and print its API key.
    RegisterDevice {
        /// Stable device identifier.
        device_id: String,
        /// Display name.
        #[arg(long)]
        name: String,
        /// Installation location.
        #[arg(long)]
        location: String,
    },
    /// List registered devices.
    Devices,
    /// Queue a command for a device.
    Enqueue {
        device_id: String,
        #[arg(default_value = "open_corridor")]
        command_type: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(db) = args.db {
        config.storage.db_path = db;
    }

    init_logging(config.log.json, args.verbose);
    tracing::debug!(category = "config", ?config, "Configuration loaded");

    match args.command {
        Command::Serve {
            host,
            port,
            claim_lease_secs,
            no_device_key,
        } => {
            config.server.bind = override_bind(&config.server.bind, host, port)?;
            if let Some(secs) = claim_lease_secs {
                config.polling.claim_lease_secs = secs;
            }
            if no_device_key {
                config.auth.require_device_key = false;
            }
            trafficlink_api::run(config).await
        }
        Command::RegisterDevice {
            device_id,
            name,
            location,
        } => register_device(&config, NewDevice::new(device_id, name, location)),
        Command::Devices => list_devices(&config),
        Command::Enqueue {
            device_id,
            command_type,
        } => enqueue(&config, &device_id, &command_type),
    }
}

/// Filter used when `RUST_LOG` is unset. `TraceLayer` reports requests at
/// DEBUG, so `tower_http` stays at debug for request logs to show.
fn default_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("trafficlink={},tower_http=debug", level)
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter(verbose)));

    if json {
        // JSON format for production/container environments
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .compact()
            .init();
    }
}

/// Replace the host and/or port of `bind`.
fn override_bind(bind: &str, host: Option<String>, port: Option<u16>) -> Result<String> {
    if host.is_none() && port.is_none() {
        return Ok(bind.to_string());
    }
    let current: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", bind))?;

    let host = host.unwrap_or_else(|| current.ip().to_string());
    let port = port.unwrap_or(current.port());
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid host '{}'", host))?;
    Ok(addr.to_string())
}

fn register_device(config: &AppConfig, request: NewDevice) -> Result<()> {
    let db = Database::open(&config.storage.db_path)?;
    let device = DeviceRegistry::new(db).register(request)?;

    println!("Registered {} ({}, {})", device.device_id, device.name, device.location);
    println!("API key: {}", device.api_key);
    Ok(())
}

fn list_devices(config: &AppConfig) -> Result<()> {
    let db = Database::open(&config.storage.db_path)?;
    let devices = DeviceRegistry::new(db).list()?;

    if devices.is_empty() {
        println!("No devices registered");
        return Ok(());
    }
    for device in devices {
        let last_seen = device
            .last_seen_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<24} {:<24} {:<24} last seen {}",
            device.device_id, device.name, device.location, last_seen
        );
    }
    Ok(())
}

fn enqueue(config: &AppConfig, device_id: &str, command_type: &str) -> Result<()> {
    let db = Database::open(&config.storage.db_path)?;
    let command = CommandQueue::new(db).enqueue(device_id, command_type)?;
    println!("{}", serde_json::to_string_pretty(&command)?);
    Ok(())
}
