//! huebridge daemon - Main entry point
//!
//! Runs the master coordinator, the worker gateway (Hue API and SSDP) or
//! both, depending on the configured role.

mod api;
mod config;
mod master;
mod server;
mod state;
mod virtual_device;
mod worker;

use anyhow::{Context, Result};
use clap::Parser;
use huebridge_discovery::SsdpResponder;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::Role;

#[derive(Parser, Debug)]
#[command(name = "huebridge")]
#[command(about = "Philips Hue bridge emulator for generic smart-home devices")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "huebridge.toml")]
    config: PathBuf,

    /// Bind address for the Hue API
    #[arg(short, long)]
    bind: Option<String>,

    /// Address advertised to Hue clients (IPv4 host:port)
    #[arg(short, long)]
    advertise: Option<String>,

    /// Which half of the emulator to run
    #[arg(short, long, value_enum)]
    role: Option<Role>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", config::sample_config()?);
        return Ok(());
    }

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("huebridge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration, command line wins
    let mut config = config::load_config(&args.config)?;
    if let Some(bind) = args.bind {
        config.daemon.bind = Some(bind);
    }
    if let Some(advertise) = args.advertise {
        config.emulator.advertised_address = advertise;
    }
    if let Some(role) = args.role {
        config.daemon.role = role;
    }

    info!(
        role = ?config.daemon.role,
        advertised = %config.emulator.advertised_address,
        filters = ?config.emulator.devices,
        "Configuration loaded"
    );

    let node = state::Node::start(&config)
        .await
        .context("invalid emulator settings")?;

    let result = match node.app_state() {
        Some(app_state) => {
            let ssdp = SsdpResponder::start(node.profile.clone())
                .await
                .context("failed to start SSDP responder")?;
            info!(
                interfaces = ?ssdp.joined_interfaces(),
                location = %node.profile.location(),
                "Advertising bridge"
            );

            let bind = config.bind_address(&node.settings);
            let served = server::run(app_state, &bind, shutdown_signal()).await;
            ssdp.stop().await;
            served
        }
        None => {
            // Master only: everything runs on the bus loops
            shutdown_signal().await;
            Ok(())
        }
    };

    if let Err(e) = &result {
        error!(error = %e, "Hue API server failed");
    }

    if let Some(master) = &node.master {
        let stats = master.stats().await;
        info!(?stats, "Master statistics");
    }

    node.shutdown().await;
    result
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
